//! Correlation pipeline
//!
//! One operation per message kind, all following the same skeleton:
//! extract the flow-scoped fields, resolve (or, for a quote, create) the
//! flow identity, build the relationship edge, persist message + nodes +
//! edge, stamp the processing duration, and fire the downstream
//! notification.
//!
//! The quote establishes the pseudonymized identities; every follow-up
//! recovers them through the cache-aside read: try the fast cache first,
//! and on a miss rebuild the entry from the durably stored quote. The
//! rebuild is a pure function of that quote, so concurrent rebuilds for
//! the same flow converge on identical values and the last cache write
//! wins harmlessly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info};

use crate::cache::FastCache;
use crate::config::Config;
use crate::hasher;
use crate::messages::{
    DataCache, PaymentMessage, QuoteMessage, QuoteReplyMessage, TransferMessage,
    TransferStatusMessage,
};
use crate::notifier::Notifier;
use crate::relationship::RelationshipEdge;
use crate::store::DurableStore;
use crate::{PrepError, PrepResult};

/// Per-kind collection names for message records
#[derive(Debug, Clone)]
struct Collections {
    quote: String,
    quote_reply: String,
    transfer: String,
    transfer_status: String,
}

/// Orchestrates identity hashing, cache-aside resolution, edge building,
/// and persistence for each inbound message.
///
/// Collaborators are injected as trait objects so tests can substitute
/// them without touching process-global state.
pub struct CorrelationPipeline {
    cache: Arc<dyn FastCache>,
    store: Arc<dyn DurableStore>,
    notifier: Arc<dyn Notifier>,
    scoring_endpoint: String,
    cache_ttl: Duration,
    collections: Collections,
}

impl CorrelationPipeline {
    /// Wire a pipeline from its collaborators and configuration
    pub fn new(
        cache: Arc<dyn FastCache>,
        store: Arc<dyn DurableStore>,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        Self {
            cache,
            store,
            notifier,
            scoring_endpoint: config.downstream.scoring_endpoint.clone(),
            cache_ttl: Duration::from_secs(config.cache.ttl_seconds),
            collections: Collections {
                quote: config.database.quote_collection.clone(),
                quote_reply: config.database.quote_reply_collection.clone(),
                transfer: config.database.transfer_collection.clone(),
                transfer_status: config.database.transfer_status_collection.clone(),
            },
        }
    }

    /// Process one inbound message, dispatching on its kind. The message
    /// is enriched in place; the caller keeps it whether processing
    /// succeeds or fails.
    pub async fn process(&self, message: &mut PaymentMessage) -> PrepResult<()> {
        match message {
            PaymentMessage::Quote(msg) => self.quote(msg).await,
            PaymentMessage::QuoteReply(msg) => self.quote_reply(msg).await,
            PaymentMessage::Transfer(msg) => self.transfer(msg).await,
            PaymentMessage::TransferStatus(msg) => self.transfer_status(msg).await,
        }
    }

    /// Handle an originating quote: establishes the flow identity entry
    /// that every follow-up message recovers.
    pub async fn quote(&self, msg: &mut QuoteMessage) -> PrepResult<()> {
        info!("Start - Handle quote message");
        let started = Instant::now();

        let (debtor_hash, creditor_hash, end_to_end_id, created_at, debtor_acct, creditor_acct) = {
            let info = &msg.body.payment_info;
            (
                hasher::hash_key(&info.debtor_key()),
                hasher::hash_key(&info.creditor_key()),
                info.credit_transfer.payment_id.end_to_end_id.clone(),
                msg.body.group_header.created_at.clone(),
                info.debtor_key().account_id.to_string(),
                info.creditor_key().account_id.to_string(),
            )
        };
        let data_cache = DataCache {
            creditor_party_id: msg.body.payment_info.creditor_party_id().to_string(),
            debtor_party_id: msg.body.payment_info.debtor_party_id().to_string(),
            creditor_account_hash: creditor_hash.clone(),
            debtor_account_hash: debtor_hash.clone(),
        };

        let edge = RelationshipEdge::for_quote(msg, &debtor_hash, &creditor_hash);

        msg.end_to_end_id = Some(end_to_end_id.clone());
        msg.debtor_acct_id = Some(debtor_acct);
        msg.creditor_acct_id = Some(creditor_acct);
        msg.cre_dt_tm = Some(created_at.clone());
        msg.data_cache = Some(data_cache.clone());

        let record = tagged_record("pain.001.001.11", msg)?;
        let quote_key = format!("quote_{end_to_end_id}");
        let result = async {
            tokio::try_join!(
                self.store.save_message_record(
                    &record,
                    &self.collections.quote,
                    &quote_key,
                ),
                self.store.add_account_node(&debtor_hash),
                self.store.add_account_node(&creditor_hash),
                self.store
                    .add_party_node(&data_cache.creditor_party_id, &created_at),
                self.store
                    .add_party_node(&data_cache.debtor_party_id, &created_at),
            )?;

            tokio::try_join!(
                self.store.save_edge(&edge),
                self.store.link_party_to_account(
                    &data_cache.creditor_party_id,
                    &creditor_hash,
                    &created_at,
                ),
                self.store.link_party_to_account(
                    &data_cache.debtor_party_id,
                    &debtor_hash,
                    &created_at,
                ),
            )?;

            self.write_identity_cache(&end_to_end_id, &data_cache).await
        }
        .await;

        msg.prcg_tm = Some(elapsed_ms(started));
        if let Err(e) = result {
            error!("Failed to persist quote message: {e}");
            return Err(e);
        }

        self.spawn_notify(tagged_record("pain.001.001.11", msg)?);
        info!("End - Handle quote message");
        Ok(())
    }

    /// Handle a quote reply. The edge runs in the request direction,
    /// creditor to debtor.
    pub async fn quote_reply(&self, msg: &mut QuoteReplyMessage) -> PrepResult<()> {
        info!("Start - Handle quote reply message");
        let started = Instant::now();

        let (debtor_hash, creditor_hash, end_to_end_id) = {
            let info = &msg.body.payment_info;
            (
                hasher::hash_key(&info.debtor_key()),
                hasher::hash_key(&info.creditor_key()),
                info.credit_transfer.payment_id.end_to_end_id.clone(),
            )
        };

        msg.end_to_end_id = Some(end_to_end_id.clone());
        msg.data_cache = self.resolve_identity_cache(&end_to_end_id).await?;

        let edge = RelationshipEdge::for_quote_reply(msg, &debtor_hash, &creditor_hash);

        let record = tagged_record("pain.013.001.09", msg)?;
        let quote_reply_key = format!("quote_reply_{end_to_end_id}");
        let result = async {
            tokio::try_join!(
                self.store.save_message_record(
                    &record,
                    &self.collections.quote_reply,
                    &quote_reply_key,
                ),
                self.store.add_account_node(&debtor_hash),
                self.store.add_account_node(&creditor_hash),
            )?;

            self.store.save_edge(&edge).await
        }
        .await;

        msg.prcg_tm = Some(elapsed_ms(started));
        if let Err(e) = result {
            error!("Failed to persist quote reply message: {e}");
            return Err(e);
        }

        self.spawn_notify(tagged_record("pain.013.001.09", msg)?);
        info!("End - Handle quote reply message");
        Ok(())
    }

    /// Handle a funds transfer: a push, so the edge runs debtor to
    /// creditor.
    pub async fn transfer(&self, msg: &mut TransferMessage) -> PrepResult<()> {
        info!("Start - Handle transfer message");
        let started = Instant::now();

        let (debtor_hash, creditor_hash, end_to_end_id, created_at, debtor_acct, creditor_acct) = {
            let ct = &msg.body.credit_transfer;
            (
                hasher::hash_key(&ct.debtor_key()),
                hasher::hash_key(&ct.creditor_key()),
                ct.payment_id.end_to_end_id.clone(),
                msg.body.group_header.created_at.clone(),
                ct.debtor_key().account_id.to_string(),
                ct.creditor_key().account_id.to_string(),
            )
        };

        msg.end_to_end_id = Some(end_to_end_id.clone());
        msg.debtor_acct_id = Some(debtor_acct);
        msg.creditor_acct_id = Some(creditor_acct);
        msg.cre_dt_tm = Some(created_at);
        msg.data_cache = self.resolve_identity_cache(&end_to_end_id).await?;

        let edge = RelationshipEdge::for_transfer(msg, &debtor_hash, &creditor_hash);

        let record = tagged_record("pacs.008.001.10", msg)?;
        let transfer_key = format!("transfer_{end_to_end_id}");
        let result = async {
            tokio::try_join!(
                self.store.save_message_record(
                    &record,
                    &self.collections.transfer,
                    &transfer_key,
                ),
                self.store.add_account_node(&debtor_hash),
                self.store.add_account_node(&creditor_hash),
            )?;

            self.store.save_edge(&edge).await
        }
        .await;

        msg.prcg_tm = Some(elapsed_ms(started));
        if let Err(e) = result {
            error!("Failed to persist transfer message: {e}");
            return Err(e);
        }

        self.spawn_notify(tagged_record("pacs.008.001.10", msg)?);
        info!("End - Handle transfer message");
        Ok(())
    }

    /// Handle a transfer status report. The edge direction comes from the
    /// originating transfer, not from the status message's own parties;
    /// a flow without a stored transfer cannot be resolved and fails.
    pub async fn transfer_status(&self, msg: &mut TransferStatusMessage) -> PrepResult<()> {
        info!("Start - Handle transfer status message");
        let started = Instant::now();

        let end_to_end_id = msg.body.status_info.original_end_to_end_id.clone();
        let message_id = msg.body.group_header.message_id.clone();

        msg.end_to_end_id = Some(end_to_end_id.clone());
        msg.tx_sts = Some(msg.body.status_info.status.clone());
        msg.data_cache = self.resolve_identity_cache(&end_to_end_id).await?;

        let mut edge = RelationshipEdge::for_transfer_status(msg);

        let record = tagged_record("pacs.002.001.12", msg)?;
        let result = async {
            self.store
                .save_message_record(&record, &self.collections.transfer_status, &message_id)
                .await?;

            let transfers = self.store.find_transfer_by_end_to_end_id(&end_to_end_id).await?;
            let Some(transfer) = transfers.into_iter().next() else {
                return Err(PrepError::Storage(format!(
                    "no originating transfer found for {end_to_end_id}"
                )));
            };

            let ct = &transfer.body.credit_transfer;
            let creditor_hash = hasher::hash_key(&ct.creditor_key());
            let debtor_hash = hasher::hash_key(&ct.debtor_key());
            edge.resolve_endpoints(&creditor_hash, &debtor_hash);

            self.store.save_edge(&edge).await
        }
        .await;

        msg.prcg_tm = Some(elapsed_ms(started));
        if let Err(e) = result {
            error!("Failed to persist transfer status message: {e}");
            return Err(e);
        }

        self.spawn_notify(tagged_record("pacs.002.001.12", msg)?);
        info!("End - Handle transfer status message");
        Ok(())
    }

    /// Cache-aside read of the flow identity: fast cache first, rebuild
    /// from the durably stored quote on miss or parse failure. Returns
    /// `None` only when no originating quote exists.
    async fn resolve_identity_cache(&self, end_to_end_id: &str) -> PrepResult<Option<DataCache>> {
        match self.cache.get(end_to_end_id).await {
            Ok(Some(raw)) => match serde_json::from_str::<DataCache>(&raw) {
                Ok(data_cache) => return Ok(Some(data_cache)),
                Err(e) => {
                    info!("Cached identity entry for {end_to_end_id} failed to parse: {e}");
                }
            },
            Ok(None) => {}
            Err(e) => {
                info!("Fast cache read for {end_to_end_id} failed: {e}");
            }
        }

        info!("Identity cache miss for {end_to_end_id}. Proceeding with durable-store rebuild.");
        self.rebuild_identity_cache(end_to_end_id).await
    }

    /// Reconstruct the flow identity from the stored quote and repopulate
    /// the fast cache. Idempotent: the entry is a pure function of the
    /// quote record, so repeated rebuilds write identical values.
    async fn rebuild_identity_cache(&self, end_to_end_id: &str) -> PrepResult<Option<DataCache>> {
        let quotes = self.store.find_quote_by_end_to_end_id(end_to_end_id).await?;
        let Some(quote) = quotes.into_iter().next() else {
            error!("Could not find an originating quote to rebuild the identity cache with");
            return Ok(None);
        };

        let info = &quote.body.payment_info;
        let data_cache = DataCache {
            creditor_party_id: info.creditor_party_id().to_string(),
            debtor_party_id: info.debtor_party_id().to_string(),
            creditor_account_hash: hasher::hash_key(&info.creditor_key()),
            debtor_account_hash: hasher::hash_key(&info.debtor_key()),
        };

        self.write_identity_cache(end_to_end_id, &data_cache).await?;
        Ok(Some(data_cache))
    }

    async fn write_identity_cache(
        &self,
        end_to_end_id: &str,
        data_cache: &DataCache,
    ) -> PrepResult<()> {
        let payload = serde_json::to_string(data_cache)
            .map_err(|e| PrepError::Cache(format!("failed to encode identity entry: {e}")))?;
        self.cache.set(end_to_end_id, &payload, self.cache_ttl).await
    }

    /// Forward the enriched message to the scoring endpoint on a detached
    /// task with its own error boundary, so a slow or failing endpoint
    /// never sits on the pipeline's critical path.
    fn spawn_notify(&self, payload: serde_json::Value) {
        let notifier = Arc::clone(&self.notifier);
        let endpoint = self.scoring_endpoint.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.post(&endpoint, &payload).await {
                error!("Error while notifying scoring endpoint {endpoint}: {e}");
            }
        });
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Serialize a message record with its `TxTp` type code restored
fn tagged_record<T: Serialize>(kind: &str, msg: &T) -> PrepResult<serde_json::Value> {
    let mut value = serde_json::to_value(msg)
        .map_err(|e| PrepError::Message(format!("failed to serialize message: {e}")))?;
    value["TxTp"] = serde_json::Value::String(kind.to_string());
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::messages::fixtures;

    #[derive(Default)]
    struct MockCache {
        entries: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl FastCache for MockCache {
        async fn get(&self, key: &str) -> PrepResult<Option<String>> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str, _ttl: Duration) -> PrepResult<()> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockStore {
        records: Mutex<Vec<(String, String, serde_json::Value)>>,
        accounts: Mutex<Vec<String>>,
        parties: Mutex<Vec<String>>,
        links: Mutex<Vec<(String, String)>>,
        edges: Mutex<Vec<RelationshipEdge>>,
        quotes: Mutex<Vec<QuoteMessage>>,
        transfers: Mutex<Vec<TransferMessage>>,
        quote_lookups: AtomicUsize,
        fail_record_saves: AtomicBool,
    }

    impl MockStore {
        fn with_quote(self) -> Self {
            let PaymentMessage::Quote(quote) = fixtures::quote() else {
                unreachable!()
            };
            self.quotes.lock().unwrap().push(quote);
            self
        }

        fn with_transfer(self) -> Self {
            let PaymentMessage::Transfer(transfer) = fixtures::transfer() else {
                unreachable!()
            };
            self.transfers.lock().unwrap().push(transfer);
            self
        }
    }

    #[async_trait]
    impl DurableStore for MockStore {
        async fn save_message_record(
            &self,
            record: &serde_json::Value,
            collection: &str,
            key: &str,
        ) -> PrepResult<()> {
            if self.fail_record_saves.load(Ordering::SeqCst) {
                return Err(PrepError::Storage("deliberate error".to_string()));
            }
            self.records.lock().unwrap().push((
                collection.to_string(),
                key.to_string(),
                record.clone(),
            ));
            Ok(())
        }

        async fn add_account_node(&self, account_hash: &str) -> PrepResult<()> {
            self.accounts.lock().unwrap().push(account_hash.to_string());
            Ok(())
        }

        async fn add_party_node(&self, party_id: &str, _created_at: &str) -> PrepResult<()> {
            self.parties.lock().unwrap().push(party_id.to_string());
            Ok(())
        }

        async fn link_party_to_account(
            &self,
            party_id: &str,
            account_hash: &str,
            _created_at: &str,
        ) -> PrepResult<()> {
            self.links
                .lock()
                .unwrap()
                .push((party_id.to_string(), account_hash.to_string()));
            Ok(())
        }

        async fn save_edge(&self, edge: &RelationshipEdge) -> PrepResult<()> {
            self.edges.lock().unwrap().push(edge.clone());
            Ok(())
        }

        async fn find_quote_by_end_to_end_id(
            &self,
            end_to_end_id: &str,
        ) -> PrepResult<Vec<QuoteMessage>> {
            self.quote_lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .quotes
                .lock()
                .unwrap()
                .iter()
                .filter(|q| {
                    q.body.payment_info.credit_transfer.payment_id.end_to_end_id == end_to_end_id
                })
                .cloned()
                .collect())
        }

        async fn find_transfer_by_end_to_end_id(
            &self,
            end_to_end_id: &str,
        ) -> PrepResult<Vec<TransferMessage>> {
            Ok(self
                .transfers
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.body.credit_transfer.payment_id.end_to_end_id == end_to_end_id)
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct MockNotifier {
        fail: bool,
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn post(&self, _endpoint: &str, _body: &serde_json::Value) -> PrepResult<u16> {
            if self.fail {
                Err(PrepError::Notify("connection refused".to_string()))
            } else {
                Ok(200)
            }
        }
    }

    fn pipeline(
        cache: Arc<MockCache>,
        store: Arc<MockStore>,
        notifier: MockNotifier,
    ) -> CorrelationPipeline {
        CorrelationPipeline::new(cache, store, Arc::new(notifier), &Config::default())
    }

    fn expected_data_cache() -> DataCache {
        DataCache {
            creditor_party_id: "+42-966969344".to_string(),
            debtor_party_id: "+36-432226947".to_string(),
            creditor_account_hash: fixtures::CREDITOR_ACCOUNT_HASH.to_string(),
            debtor_account_hash: fixtures::DEBTOR_ACCOUNT_HASH.to_string(),
        }
    }

    #[tokio::test]
    async fn test_quote_establishes_identity() {
        let cache = Arc::new(MockCache::default());
        let store = Arc::new(MockStore::default());
        let p = pipeline(cache.clone(), store.clone(), MockNotifier::default());

        let mut msg = fixtures::quote();
        p.process(&mut msg).await.unwrap();

        let PaymentMessage::Quote(quote) = &msg else {
            unreachable!()
        };
        assert_eq!(quote.data_cache.as_ref(), Some(&expected_data_cache()));
        assert_eq!(
            quote.end_to_end_id.as_deref(),
            Some(fixtures::QUOTE_END_TO_END_ID)
        );
        assert!(quote.prcg_tm.is_some());

        // the identity entry landed in the fast cache
        let cached = cache
            .get(fixtures::QUOTE_END_TO_END_ID)
            .await
            .unwrap()
            .expect("cache entry");
        let parsed: DataCache = serde_json::from_str(&cached).unwrap();
        assert_eq!(parsed, expected_data_cache());

        // record, both account nodes, both party nodes, both links, one edge
        let records = store.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, "quote_history");
        assert_eq!(
            records[0].1,
            format!("quote_{}", fixtures::QUOTE_END_TO_END_ID)
        );
        assert_eq!(records[0].2["TxTp"], "pain.001.001.11");
        drop(records);

        assert_eq!(store.accounts.lock().unwrap().len(), 2);
        assert_eq!(store.parties.lock().unwrap().len(), 2);
        assert_eq!(store.links.lock().unwrap().len(), 2);

        let edges = store.edges.lock().unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(
            edges[0].from,
            format!("accounts/{}", fixtures::DEBTOR_ACCOUNT_HASH)
        );
        assert_eq!(
            edges[0].to,
            format!("accounts/{}", fixtures::CREDITOR_ACCOUNT_HASH)
        );
    }

    #[tokio::test]
    async fn test_reply_served_from_fast_cache() {
        let cache = Arc::new(MockCache::default());
        let store = Arc::new(MockStore::default());
        cache
            .set(
                fixtures::QUOTE_END_TO_END_ID,
                &serde_json::to_string(&expected_data_cache()).unwrap(),
                Duration::from_secs(150),
            )
            .await
            .unwrap();

        let p = pipeline(cache, store.clone(), MockNotifier::default());
        let mut msg = fixtures::quote_reply();
        p.process(&mut msg).await.unwrap();

        let PaymentMessage::QuoteReply(reply) = &msg else {
            unreachable!()
        };
        assert_eq!(reply.data_cache.as_ref(), Some(&expected_data_cache()));
        // durable storage was never consulted
        assert_eq!(store.quote_lookups.load(Ordering::SeqCst), 0);

        // the reply edge runs creditor -> debtor, hashed from its own fields
        let edges = store.edges.lock().unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(
            edges[0].from,
            format!(
                "accounts/{}",
                hasher::account_hash("dfsp002", "+04-830018596", "dfsp002")
            )
        );
    }

    #[tokio::test]
    async fn test_reply_rebuilds_on_cache_miss() {
        let cache = Arc::new(MockCache::default());
        let store = Arc::new(MockStore::default().with_quote());

        let p = pipeline(cache.clone(), store.clone(), MockNotifier::default());
        let mut msg = fixtures::quote_reply();
        p.process(&mut msg).await.unwrap();

        let PaymentMessage::QuoteReply(reply) = &msg else {
            unreachable!()
        };
        assert_eq!(reply.data_cache.as_ref(), Some(&expected_data_cache()));
        assert_eq!(store.quote_lookups.load(Ordering::SeqCst), 1);

        // the fast cache was repopulated for the next reader
        assert!(cache
            .get(fixtures::QUOTE_END_TO_END_ID)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_garbled_cache_entry_falls_through_to_rebuild() {
        let cache = Arc::new(MockCache::default());
        let store = Arc::new(MockStore::default().with_quote());
        cache
            .set(
                fixtures::QUOTE_END_TO_END_ID,
                "not json",
                Duration::from_secs(150),
            )
            .await
            .unwrap();

        let p = pipeline(cache, store.clone(), MockNotifier::default());
        let mut msg = fixtures::quote_reply();
        p.process(&mut msg).await.unwrap();

        let PaymentMessage::QuoteReply(reply) = &msg else {
            unreachable!()
        };
        assert_eq!(reply.data_cache.as_ref(), Some(&expected_data_cache()));
        assert_eq!(store.quote_lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rebuild_is_idempotent() {
        let cache = Arc::new(MockCache::default());
        let store = Arc::new(MockStore::default().with_quote());
        let p = pipeline(cache.clone(), store, MockNotifier::default());

        let first = p
            .rebuild_identity_cache(fixtures::QUOTE_END_TO_END_ID)
            .await
            .unwrap()
            .expect("identity");
        let second = p
            .rebuild_identity_cache(fixtures::QUOTE_END_TO_END_ID)
            .await
            .unwrap()
            .expect("identity");

        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_rebuild_not_found_continues_without_identity() {
        let cache = Arc::new(MockCache::default());
        let store = Arc::new(MockStore::default());
        let p = pipeline(cache, store.clone(), MockNotifier::default());

        let mut msg = fixtures::quote_reply();
        p.process(&mut msg).await.unwrap();

        let PaymentMessage::QuoteReply(reply) = &msg else {
            unreachable!()
        };
        // the flow proceeds with no identity: persisted, edge written
        assert!(reply.data_cache.is_none());
        assert!(reply.prcg_tm.is_some());
        assert_eq!(store.records.lock().unwrap().len(), 1);
        assert_eq!(store.edges.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_propagates_and_still_stamps_duration() {
        let cache = Arc::new(MockCache::default());
        let store = Arc::new(MockStore::default().with_quote());
        store.fail_record_saves.store(true, Ordering::SeqCst);
        let p = pipeline(cache, store, MockNotifier::default());

        let mut msg = fixtures::transfer();
        let err = p.process(&mut msg).await.unwrap_err();
        assert!(matches!(err, PrepError::Storage(_)));

        let PaymentMessage::Transfer(transfer) = &msg else {
            unreachable!()
        };
        assert!(transfer.prcg_tm.is_some());
    }

    #[tokio::test]
    async fn test_notifier_failure_never_fails_pipeline() {
        let cache = Arc::new(MockCache::default());
        let store = Arc::new(MockStore::default());
        let p = pipeline(cache, store, MockNotifier { fail: true });

        let mut msg = fixtures::quote();
        p.process(&mut msg).await.unwrap();
        // give the detached notification task a chance to run its error path
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_status_direction_comes_from_original_transfer() {
        let cache = Arc::new(MockCache::default());
        let store = Arc::new(MockStore::default().with_transfer());
        // identity already cached for this flow
        cache
            .set(
                fixtures::TRANSFER_END_TO_END_ID,
                &serde_json::to_string(&expected_data_cache()).unwrap(),
                Duration::from_secs(150),
            )
            .await
            .unwrap();

        let p = pipeline(cache, store.clone(), MockNotifier::default());
        let mut msg = fixtures::transfer_status();
        p.process(&mut msg).await.unwrap();

        let records = store.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, "transfer_status_history");
        // status records key by their message id, not the flow id
        assert_eq!(records[0].1, "136a-dbb6-43d8-a565-86b8f322411e");
        drop(records);

        let edges = store.edges.lock().unwrap();
        assert_eq!(edges.len(), 1);
        // endpoints hashed from the stored transfer's creditor/debtor
        assert_eq!(
            edges[0].from,
            format!(
                "accounts/{}",
                hasher::account_hash("dfsp002", "+07-197368463", "MSISDN")
            )
        );
        assert_eq!(
            edges[0].to,
            format!(
                "accounts/{}",
                hasher::account_hash("typology003", "+01-710694778", "MSISDN")
            )
        );
        assert!(edges[0].amount.is_none());
        assert_eq!(edges[0].status.as_deref(), Some("ACCC"));
    }

    #[tokio::test]
    async fn test_status_without_original_transfer_fails() {
        let cache = Arc::new(MockCache::default());
        let store = Arc::new(MockStore::default());
        let p = pipeline(cache, store.clone(), MockNotifier::default());

        let mut msg = fixtures::transfer_status();
        let err = p.process(&mut msg).await.unwrap_err();
        assert!(matches!(err, PrepError::Storage(_)));

        let PaymentMessage::TransferStatus(status) = &msg else {
            unreachable!()
        };
        assert!(status.prcg_tm.is_some());
        // no edge was written for the unresolvable flow
        assert!(store.edges.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cache_hit_and_rebuild_agree() {
        let cache = Arc::new(MockCache::default());
        let store = Arc::new(MockStore::default());
        let p = pipeline(cache.clone(), store.clone(), MockNotifier::default());

        // the quote both populates the cache and persists durably
        let mut quote = fixtures::quote();
        p.process(&mut quote).await.unwrap();
        let PaymentMessage::Quote(q) = quote else {
            unreachable!()
        };
        store.quotes.lock().unwrap().push(q);

        // first reply: served from the fast cache
        let mut reply = fixtures::quote_reply();
        p.process(&mut reply).await.unwrap();
        let PaymentMessage::QuoteReply(r1) = reply else {
            unreachable!()
        };

        // second reply: cache wiped, identity rebuilt from the quote record
        cache.entries.lock().unwrap().clear();
        let mut reply = fixtures::quote_reply();
        p.process(&mut reply).await.unwrap();
        let PaymentMessage::QuoteReply(r2) = reply else {
            unreachable!()
        };

        assert_eq!(r1.data_cache, r2.data_cache);
        assert_eq!(r1.data_cache.as_ref(), Some(&expected_data_cache()));
    }
}
