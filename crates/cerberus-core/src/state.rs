//! Long-lived per-instance state: keypair, fingerprint, and the four caches.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use ed25519_dalek::pkcs8::EncodePrivateKey;
use ed25519_dalek::{SigningKey, VerifyingKey};
use jsonwebtoken::{DecodingKey, EncodingKey};
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::Config;
use crate::constants::{cost, purge, NONCE_TTL};
use crate::error::CerberusError;
use crate::expiremap::{spawn_sweeper, ExpireMap};
use crate::ipblock::IpBlock;

fn hash_ip_block(block: &IpBlock) -> u32 {
    // Fibonacci multiplicative hash; keys are already well-mixed prefixes
    (block.to_u64().wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32) as u32
}

fn hash_uuid(id: &Uuid) -> u32 {
    let x = id.as_u128();
    ((x >> 96) ^ (x >> 64) ^ (x >> 32) ^ x) as u32
}

fn hash_nonce(nonce: &u32) -> u32 {
    *nonce
}

/// State shared by every request passing through one instance.
///
/// Counters handed out by the caches are reference-shared; mutating one after
/// its entry was evicted is harmless and invisible to the cache.
pub struct InstanceState {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    fingerprint: String,
    jwt_encoding: EncodingKey,
    jwt_decoding: DecodingKey,
    pending: Arc<ExpireMap<IpBlock, Arc<AtomicI32>>>,
    blocklist: Arc<ExpireMap<IpBlock, ()>>,
    approval: Arc<ExpireMap<Uuid, Arc<AtomicI32>>>,
    used_nonce: Arc<ExpireMap<u32, ()>>,
    shutdown: broadcast::Sender<()>,
}

impl InstanceState {
    /// Build the state for a provisioned config and start the cache
    /// sweepers. Must run inside a tokio runtime.
    pub fn new(config: &Config) -> Result<Self, CerberusError> {
        let signing_key = config.load_signing_key()?;
        let verifying_key = signing_key.verifying_key();

        // The fingerprint ties challenges to this keypair: rotate the key
        // and every outstanding cookie stops validating.
        let fingerprint = hex::encode(Sha256::digest(signing_key.to_bytes()));

        let pkcs8 = signing_key
            .to_pkcs8_der()
            .map_err(|e| CerberusError::KeyLoad(format!("failed to encode pkcs8 key: {e}")))?;
        let jwt_encoding = EncodingKey::from_ed_der(pkcs8.as_bytes());
        let jwt_decoding = DecodingKey::from_ed_der(verifying_key.as_bytes());

        // Budget split: 10% pending, 10% blocklist, 80% approvals.
        let pending_budget = config.max_mem_usage / 10;
        let blocklist_budget = config.max_mem_usage / 10;
        let approval_budget = config.max_mem_usage - pending_budget - blocklist_budget;

        let pending = Arc::new(ExpireMap::new(
            hash_ip_block,
            config.pending_ttl,
            pending_budget,
            cost::PENDING_ITEM,
        ));
        let blocklist = Arc::new(ExpireMap::new(
            hash_ip_block,
            config.block_ttl,
            blocklist_budget,
            cost::BLOCKLIST_ITEM,
        ));
        let approval = Arc::new(ExpireMap::new(
            hash_uuid,
            config.approval_ttl,
            approval_budget,
            cost::APPROVAL_ITEM,
        ));
        let used_nonce = Arc::new(ExpireMap::new(
            hash_nonce,
            NONCE_TTL,
            pending_budget,
            cost::BLOCKLIST_ITEM,
        ));

        let (shutdown, _) = broadcast::channel(1);
        spawn_sweeper(pending.clone(), purge::PENDING, shutdown.subscribe());
        spawn_sweeper(blocklist.clone(), purge::BLOCKLIST, shutdown.subscribe());
        spawn_sweeper(approval.clone(), purge::APPROVAL, shutdown.subscribe());
        spawn_sweeper(used_nonce.clone(), purge::USED_NONCE, shutdown.subscribe());

        Ok(Self {
            signing_key,
            verifying_key,
            fingerprint,
            jwt_encoding,
            jwt_decoding,
            pending,
            blocklist,
            approval,
            used_nonce,
            shutdown,
        })
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Hex SHA-256 of the signing key's seed; stable until key rotation.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub(crate) fn jwt_encoding_key(&self) -> &EncodingKey {
        &self.jwt_encoding
    }

    pub(crate) fn jwt_decoding_key(&self) -> &DecodingKey {
        &self.jwt_decoding
    }

    /// Entry capacities of (pending, blocklist, approval), for provision logs.
    pub fn cache_capacities(&self) -> (usize, usize, usize) {
        (
            self.pending.capacity(),
            self.blocklist.capacity(),
            self.approval.capacity(),
        )
    }

    /// Create-or-increment the pending counter for an IP block and return
    /// the resulting count.
    pub fn inc_pending(&self, block: IpBlock) -> i32 {
        let counter = self
            .pending
            .get_or_insert_with(block, || Arc::new(AtomicI32::new(0)));
        counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement the pending counter; the entry is removed once it reaches
    /// zero. Absent entries count as zero.
    pub fn dec_pending(&self, block: IpBlock) -> i32 {
        match self.pending.get(&block) {
            Some(counter) => {
                let count = counter.fetch_sub(1, Ordering::AcqRel) - 1;
                if count <= 0 {
                    self.pending.remove(&block);
                    return 0;
                }
                count
            }
            None => 0,
        }
    }

    pub fn remove_pending(&self, block: IpBlock) -> bool {
        self.pending.remove(&block)
    }

    /// Current pending count for an IP block; absent entries count as zero.
    pub fn pending_count(&self, block: IpBlock) -> i32 {
        self.pending
            .get(&block)
            .map(|counter| counter.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    pub fn insert_blocklist(&self, block: IpBlock) {
        self.blocklist.add(block, ());
    }

    pub fn contains_blocklist(&self, block: IpBlock) -> bool {
        self.blocklist.get(&block).is_some()
    }

    /// Issue a fresh approval id worth `n` gate passes.
    pub fn issue_approval(&self, n: i32) -> Uuid {
        let id = Uuid::new_v4();
        self.approval.add(id, Arc::new(AtomicI32::new(n)));
        id
    }

    /// Spend one pass of an approval. Returns whether the id is still valid;
    /// a counter driven below zero removes the entry.
    pub fn dec_approval(&self, id: &Uuid) -> bool {
        match self.approval.get(id) {
            Some(counter) => {
                let count = counter.fetch_sub(1, Ordering::AcqRel) - 1;
                if count < 0 {
                    self.approval.remove(id);
                    return false;
                }
                true
            }
            None => false,
        }
    }

    /// Reserve an answer nonce. Returns true exactly once per nonce within
    /// the nonce window.
    pub fn insert_used_nonce(&self, nonce: u32) -> bool {
        self.used_nonce.set_if_absent(nonce, (), NONCE_TTL)
    }

    /// Stop the background sweepers. In-flight cache operations finish
    /// normally.
    pub fn close(&self) {
        let _ = self.shutdown.send(());
    }
}

impl Drop for InstanceState {
    fn drop(&mut self) {
        self.close();
    }
}
