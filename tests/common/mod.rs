//! Shared fakes for integration tests.
//!
//! Keys exist only here: the signer fake derives a private key from each
//! derivation path so tests can check recovery end to end.

#![allow(dead_code)]

use alloy::consensus::{Transaction, TxEnvelope};
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{keccak256, Address, TxHash, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::{Signer, SignerSync};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use wager_settlement::blockchain::{
    BlockchainError, BlockchainResult, ChainBlock, ChainRpc, FeeData,
};
use wager_settlement::signer::derivation::DerivationResult;
use wager_settlement::signer::{
    AddressDeriver, DerivationPath, RemoteSigner, SignatureShare, SignerError, SignerResult,
};

pub const TEST_CHAIN_ID: u64 = 84532;

/// Private key behind a derivation path.
pub fn key_for(path: &DerivationPath) -> PrivateKeySigner {
    PrivateKeySigner::from_bytes(&keccak256(path.as_str().as_bytes())).unwrap()
}

pub fn address_for(path: &DerivationPath) -> Address {
    key_for(path).address()
}

/// What the node does with one submission.
#[derive(Debug, Clone)]
pub enum Reply {
    Accept,
    Reject(String),
    /// The node keeps the transaction but the caller sees an error.
    AcceptThenFail(String),
}

/// In-memory chain with scriptable submission failures.
///
/// Accepted transactions are mined at once unless [`hold_in_mempool`] is
/// set. Resending mined bytes gets "nonce too low"; resending pending
/// bytes gets "already known".
///
/// [`hold_in_mempool`]: ScriptedChain::hold_in_mempool
pub struct ScriptedChain {
    pub fee_data: FeeData,
    pub balance: U256,
    pub transaction_count: Mutex<u64>,
    /// Replies to the next submissions, in order. Empty accepts.
    pub send_script: Mutex<VecDeque<Reply>>,
    pub send_attempts: AtomicU32,
    /// Raw transactions the node accepted.
    pub accepted: Mutex<Vec<Vec<u8>>>,
    seen: Mutex<HashSet<TxHash>>,
    mempool: AtomicBool,
    pub blocks: Mutex<Vec<ChainBlock>>,
}

impl Default for ScriptedChain {
    fn default() -> Self {
        Self {
            fee_data: FeeData {
                max_fee_per_gas: 2_000_000_000,
                max_priority_fee_per_gas: 1_000_000_000,
            },
            balance: U256::from(10u64).pow(U256::from(20u64)),
            transaction_count: Mutex::new(0),
            send_script: Mutex::new(VecDeque::new()),
            send_attempts: AtomicU32::new(0),
            accepted: Mutex::new(Vec::new()),
            seen: Mutex::new(HashSet::new()),
            mempool: AtomicBool::new(false),
            blocks: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue outcomes for upcoming submissions. `None` accepts.
    pub fn script(&self, outcomes: impl IntoIterator<Item = Option<&'static str>>) {
        self.script_replies(outcomes.into_iter().map(|o| match o {
            Some(message) => Reply::Reject(message.to_string()),
            None => Reply::Accept,
        }));
    }

    pub fn script_replies(&self, replies: impl IntoIterator<Item = Reply>) {
        self.send_script.lock().unwrap().extend(replies);
    }

    /// Keep accepted transactions pending instead of mining them.
    pub fn hold_in_mempool(&self) {
        self.mempool.store(true, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> u32 {
        self.send_attempts.load(Ordering::SeqCst)
    }

    /// Accepted transactions, decoded.
    pub fn accepted_transactions(&self) -> Vec<TxEnvelope> {
        self.accepted
            .lock()
            .unwrap()
            .iter()
            .map(|raw| TxEnvelope::decode_2718(&mut raw.as_slice()).unwrap())
            .collect()
    }

    /// (recipient, value, nonce) of every accepted transaction.
    pub fn accepted_transfers(&self) -> Vec<(Address, U256, u64)> {
        self.accepted_transactions()
            .iter()
            .map(|tx| (tx.to().unwrap(), tx.value(), tx.nonce()))
            .collect()
    }
}

#[async_trait]
impl ChainRpc for ScriptedChain {
    async fn get_balance(&self, _address: Address) -> BlockchainResult<U256> {
        Ok(self.balance)
    }

    async fn get_transaction_count(&self, _address: Address) -> BlockchainResult<u64> {
        Ok(*self.transaction_count.lock().unwrap())
    }

    async fn get_fee_data(&self) -> BlockchainResult<FeeData> {
        Ok(self.fee_data)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> BlockchainResult<TxHash> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        let reply = self.send_script.lock().unwrap().pop_front().unwrap_or(Reply::Accept);
        if let Reply::Reject(message) = reply {
            return Err(BlockchainError::Rpc(message));
        }

        let hash = keccak256(raw);
        if !self.seen.lock().unwrap().insert(hash) {
            let message = if self.mempool.load(Ordering::SeqCst) {
                "server returned an error response: error code -32000: already known"
            } else {
                "server returned an error response: error code -32000: nonce too low"
            };
            return Err(BlockchainError::Rpc(message.to_string()));
        }
        self.accepted.lock().unwrap().push(raw.to_vec());
        match reply {
            Reply::AcceptThenFail(message) => Err(BlockchainError::Rpc(message)),
            _ => Ok(hash),
        }
    }

    async fn is_transaction_mined(&self, hash: TxHash) -> BlockchainResult<bool> {
        Ok(!self.mempool.load(Ordering::SeqCst) && self.seen.lock().unwrap().contains(&hash))
    }

    async fn get_block_number(&self) -> BlockchainResult<u64> {
        Ok(self.blocks.lock().unwrap().last().map_or(0, |b| b.number))
    }

    async fn get_block(&self, number: u64) -> BlockchainResult<Option<ChainBlock>> {
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.number == number)
            .cloned())
    }
}

/// Remote signer stand-in that signs with the key derived from the path.
#[derive(Default)]
pub struct KeySigner {
    /// Paths whose requests fail as unavailable.
    pub unavailable: Mutex<HashSet<String>>,
    /// Sign with this path's key instead of the requested one.
    pub impersonate: Mutex<Option<DerivationPath>>,
    pub requests: AtomicU32,
}

impl KeySigner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl RemoteSigner for KeySigner {
    async fn request_signature(
        &self,
        hash: B256,
        path: &DerivationPath,
    ) -> SignerResult<SignatureShare> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.lock().unwrap().contains(path.as_str()) {
            return Err(SignerError::Unavailable("connection refused".to_string()));
        }
        let key_path = self
            .impersonate
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| path.clone());
        let signature = key_for(&key_path).sign_hash_sync(&hash).unwrap();
        SignatureShare::new(signature.r(), signature.s(), signature.v() as u8)
    }
}

/// Derivation service stand-in consistent with [`KeySigner`].
#[derive(Default)]
pub struct KeyDeriver {
    pub calls: AtomicU32,
}

#[async_trait]
impl AddressDeriver for KeyDeriver {
    async fn derive_address(&self, path: &DerivationPath) -> DerivationResult<Address> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(address_for(path))
    }
}

/// Start an HTTP backend answering every request with `f(request body)`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let body = read_request_body(&mut socket).await;
                let (status, body) = f(body).await;
                let status_text = match status {
                    200 => "200 OK",
                    400 => "400 Bad Request",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            });
        }
    });

    addr
}

async fn read_request_body(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(split) = text.find("\r\n\r\n") {
            let length = text[..split]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= split + 4 + length {
                return String::from_utf8_lossy(&buf[split + 4..split + 4 + length]).into_owned();
            }
        }
    }
    String::new()
}
