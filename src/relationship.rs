//! Directed relationship edges between pseudonymized accounts
//!
//! Every processed message yields one edge describing who paid whom (or
//! who requested payment from whom) within the flow. Edges are computed
//! fresh per message, appended to durable storage, and never mutated.

use serde::{Deserialize, Serialize};

use crate::messages::{
    QuoteMessage, QuoteReplyMessage, TransferMessage, TransferStatusMessage,
};

/// Node-reference prefix for account vertices in the graph
const ACCOUNT_NODE_PREFIX: &str = "accounts/";

/// Opaque node reference for a pseudonymized account
pub fn account_node(account_hash: &str) -> String {
    format!("{ACCOUNT_NODE_PREFIX}{account_hash}")
}

/// A directed edge between two account nodes, annotated with flow metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipEdge {
    /// Source account node reference; empty when not yet resolvable
    pub from: String,
    /// Target account node reference; empty when not yet resolvable
    pub to: String,
    /// Instructed amount; absent for status-only messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// Instructed currency; absent for status-only messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Message creation timestamp
    pub created_at: String,
    /// Flow end-to-end identifier
    pub end_to_end_id: String,
    /// Message identifier
    pub message_id: String,
    /// Payment information identifier
    pub payment_info_id: String,
    /// Wire type code of the originating message
    pub transaction_type: String,
    /// Transaction status code (status messages only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Initiating party latitude (quote only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<String>,
    /// Initiating party longitude (quote only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub long: Option<String>,
}

impl RelationshipEdge {
    /// Edge for an originating quote: debtor pays creditor, so the edge
    /// runs debtor to creditor. Carries the initiating party's geolocation.
    pub fn for_quote(msg: &QuoteMessage, debtor_hash: &str, creditor_hash: &str) -> Self {
        let body = &msg.body;
        let info = &body.payment_info;
        let geo = body.geolocation();
        Self {
            from: account_node(debtor_hash),
            to: account_node(creditor_hash),
            amount: Some(info.credit_transfer.amount.instructed.amount.value),
            currency: Some(info.credit_transfer.amount.instructed.amount.currency.clone()),
            created_at: body.group_header.created_at.clone(),
            end_to_end_id: info.credit_transfer.payment_id.end_to_end_id.clone(),
            message_id: body.group_header.message_id.clone(),
            payment_info_id: info.payment_info_id.clone(),
            transaction_type: "pain.001.001.11".to_string(),
            status: None,
            lat: geo.map(|g| g.lat.clone()),
            long: geo.map(|g| g.long.clone()),
        }
    }

    /// Edge for a quote reply: the request direction, creditor to debtor,
    /// even though money ultimately flows the other way.
    pub fn for_quote_reply(
        msg: &QuoteReplyMessage,
        debtor_hash: &str,
        creditor_hash: &str,
    ) -> Self {
        let body = &msg.body;
        let info = &body.payment_info;
        Self {
            from: account_node(creditor_hash),
            to: account_node(debtor_hash),
            amount: Some(info.credit_transfer.amount.instructed.amount.value),
            currency: Some(info.credit_transfer.amount.instructed.amount.currency.clone()),
            created_at: body.group_header.created_at.clone(),
            end_to_end_id: info.credit_transfer.payment_id.end_to_end_id.clone(),
            message_id: body.group_header.message_id.clone(),
            payment_info_id: info.payment_info_id.clone(),
            transaction_type: "pain.013.001.09".to_string(),
            status: None,
            lat: None,
            long: None,
        }
    }

    /// Edge for a funds transfer: a push, debtor to creditor.
    pub fn for_transfer(msg: &TransferMessage, debtor_hash: &str, creditor_hash: &str) -> Self {
        let body = &msg.body;
        let ct = &body.credit_transfer;
        Self {
            from: account_node(debtor_hash),
            to: account_node(creditor_hash),
            amount: Some(ct.instructed_amount.amount.value),
            currency: Some(ct.instructed_amount.amount.currency.clone()),
            created_at: body.group_header.created_at.clone(),
            end_to_end_id: ct.payment_id.end_to_end_id.clone(),
            message_id: body.group_header.message_id.clone(),
            payment_info_id: ct.payment_id.instruction_id.clone(),
            transaction_type: "pacs.008.001.10".to_string(),
            status: None,
            lat: None,
            long: None,
        }
    }

    /// Edge for a transfer status: no amount, direction unresolved until
    /// the originating transfer is looked up (see
    /// [`resolve_endpoints`](Self::resolve_endpoints)).
    pub fn for_transfer_status(msg: &TransferStatusMessage) -> Self {
        let body = &msg.body;
        let info = &body.status_info;
        Self {
            from: String::new(),
            to: String::new(),
            amount: None,
            currency: None,
            created_at: body.group_header.created_at.clone(),
            end_to_end_id: info.original_end_to_end_id.clone(),
            message_id: body.group_header.message_id.clone(),
            payment_info_id: info.original_instruction_id.clone(),
            transaction_type: "pacs.002.001.12".to_string(),
            status: Some(info.status.clone()),
            lat: None,
            long: None,
        }
    }

    /// Fill in the endpoints of a status edge from the originating
    /// transfer's creditor/debtor account identities.
    pub fn resolve_endpoints(&mut self, from_hash: &str, to_hash: &str) {
        self.from = account_node(from_hash);
        self.to = account_node(to_hash);
    }
}
