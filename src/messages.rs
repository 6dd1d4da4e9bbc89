//! Payment message model
//!
//! The service processes four correlated message kinds sharing one
//! end-to-end identifier: an originating quote, a quote reply, a funds
//! transfer, and a transfer status report. The wire format mirrors the
//! ISO 20022 schemas (pain.001, pain.013, pacs.008, pacs.002); only the
//! fields the service reads or writes are modeled here, with their exact
//! wire tags preserved through serde renames.
//!
//! Kind discrimination happens once, at deserialization, through the
//! `TxTp` tag on [`PaymentMessage`]; handlers match on the enum instead
//! of probing the document structure.

use serde::{Deserialize, Serialize};

/// Pseudonymized flow identity, established by the originating quote and
/// recovered by every follow-up message in the same flow.
///
/// Once written the entry is immutable content: any later read must
/// reproduce exactly the values written at creation, whether served from
/// the fast cache or rebuilt from durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataCache {
    /// Raw creditor party identifier, captured from the originating quote
    pub creditor_party_id: String,
    /// Raw debtor party identifier, captured from the originating quote
    pub debtor_party_id: String,
    /// Pseudonymized creditor account identity (hex digest)
    pub creditor_account_hash: String,
    /// Pseudonymized debtor account identity (hex digest)
    pub debtor_account_hash: String,
}

/// An inbound payment message, discriminated by its `TxTp` type code
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "TxTp")]
pub enum PaymentMessage {
    /// Originating quote (pain.001)
    #[serde(rename = "pain.001.001.11")]
    Quote(QuoteMessage),
    /// Quote reply (pain.013)
    #[serde(rename = "pain.013.001.09")]
    QuoteReply(QuoteReplyMessage),
    /// Funds transfer (pacs.008)
    #[serde(rename = "pacs.008.001.10")]
    Transfer(TransferMessage),
    /// Transfer status report (pacs.002)
    #[serde(rename = "pacs.002.001.12")]
    TransferStatus(TransferStatusMessage),
}

impl PaymentMessage {
    /// Wire type code for this message kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Quote(_) => "pain.001.001.11",
            Self::QuoteReply(_) => "pain.013.001.09",
            Self::Transfer(_) => "pacs.008.001.10",
            Self::TransferStatus(_) => "pacs.002.001.12",
        }
    }

    /// Human-readable kind label, used in logs and route validation
    pub fn label(&self) -> &'static str {
        match self {
            Self::Quote(_) => "quote",
            Self::QuoteReply(_) => "quote-reply",
            Self::Transfer(_) => "transfer",
            Self::TransferStatus(_) => "transfer-status",
        }
    }
}

/// Originating quote message (pain.001)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteMessage {
    /// Message body
    #[serde(rename = "CstmrCdtTrfInitn")]
    pub body: QuoteBody,

    /// Stamped: flow end-to-end identifier
    #[serde(rename = "EndToEndId", skip_serializing_if = "Option::is_none")]
    pub end_to_end_id: Option<String>,
    /// Stamped: debtor account identifier
    #[serde(rename = "DebtorAcctId", skip_serializing_if = "Option::is_none")]
    pub debtor_acct_id: Option<String>,
    /// Stamped: creditor account identifier
    #[serde(rename = "CreditorAcctId", skip_serializing_if = "Option::is_none")]
    pub creditor_acct_id: Option<String>,
    /// Stamped: message creation timestamp
    #[serde(rename = "CreDtTm", skip_serializing_if = "Option::is_none")]
    pub cre_dt_tm: Option<String>,
    /// Stamped: resolved flow identity
    #[serde(rename = "DataCache", skip_serializing_if = "Option::is_none")]
    pub data_cache: Option<DataCache>,
    /// Stamped: processing duration in milliseconds
    #[serde(rename = "prcgTm", skip_serializing_if = "Option::is_none")]
    pub prcg_tm: Option<f64>,
}

/// Quote message body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteBody {
    /// Group header
    #[serde(rename = "GrpHdr")]
    pub group_header: GroupHeader,
    /// Payment information block
    #[serde(rename = "PmtInf")]
    pub payment_info: PaymentInfo,
    /// Supplementary data (carries the initiating party's geolocation)
    #[serde(rename = "SplmtryData", skip_serializing_if = "Option::is_none")]
    pub supplementary: Option<SupplementaryData>,
}

/// Quote reply message (pain.013)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteReplyMessage {
    /// Message body
    #[serde(rename = "CdtrPmtActvtnReq")]
    pub body: QuoteReplyBody,

    /// Stamped: flow end-to-end identifier
    #[serde(rename = "EndToEndId", skip_serializing_if = "Option::is_none")]
    pub end_to_end_id: Option<String>,
    /// Stamped: resolved flow identity
    #[serde(rename = "DataCache", skip_serializing_if = "Option::is_none")]
    pub data_cache: Option<DataCache>,
    /// Stamped: processing duration in milliseconds
    #[serde(rename = "prcgTm", skip_serializing_if = "Option::is_none")]
    pub prcg_tm: Option<f64>,
}

/// Quote reply message body; structurally the payment block matches the
/// originating quote's
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteReplyBody {
    /// Group header
    #[serde(rename = "GrpHdr")]
    pub group_header: GroupHeader,
    /// Payment information block
    #[serde(rename = "PmtInf")]
    pub payment_info: PaymentInfo,
}

/// Funds transfer message (pacs.008)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferMessage {
    /// Message body
    #[serde(rename = "FIToFICstmrCdt")]
    pub body: TransferBody,

    /// Stamped: flow end-to-end identifier
    #[serde(rename = "EndToEndId", skip_serializing_if = "Option::is_none")]
    pub end_to_end_id: Option<String>,
    /// Stamped: debtor account identifier
    #[serde(rename = "DebtorAcctId", skip_serializing_if = "Option::is_none")]
    pub debtor_acct_id: Option<String>,
    /// Stamped: creditor account identifier
    #[serde(rename = "CreditorAcctId", skip_serializing_if = "Option::is_none")]
    pub creditor_acct_id: Option<String>,
    /// Stamped: message creation timestamp
    #[serde(rename = "CreDtTm", skip_serializing_if = "Option::is_none")]
    pub cre_dt_tm: Option<String>,
    /// Stamped: resolved flow identity
    #[serde(rename = "DataCache", skip_serializing_if = "Option::is_none")]
    pub data_cache: Option<DataCache>,
    /// Stamped: processing duration in milliseconds
    #[serde(rename = "prcgTm", skip_serializing_if = "Option::is_none")]
    pub prcg_tm: Option<f64>,
}

/// Transfer message body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferBody {
    /// Group header
    #[serde(rename = "GrpHdr")]
    pub group_header: GroupHeader,
    /// Credit transfer details, flat in pacs.008
    #[serde(rename = "CdtTrfTxInf")]
    pub credit_transfer: TransferCreditTransfer,
}

/// Transfer status message (pacs.002)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferStatusMessage {
    /// Message body
    #[serde(rename = "FIToFIPmtSts")]
    pub body: TransferStatusBody,

    /// Stamped: flow end-to-end identifier (the original transfer's)
    #[serde(rename = "EndToEndId", skip_serializing_if = "Option::is_none")]
    pub end_to_end_id: Option<String>,
    /// Stamped: transaction status code
    #[serde(rename = "TxSts", skip_serializing_if = "Option::is_none")]
    pub tx_sts: Option<String>,
    /// Stamped: resolved flow identity
    #[serde(rename = "DataCache", skip_serializing_if = "Option::is_none")]
    pub data_cache: Option<DataCache>,
    /// Stamped: processing duration in milliseconds
    #[serde(rename = "prcgTm", skip_serializing_if = "Option::is_none")]
    pub prcg_tm: Option<f64>,
}

/// Transfer status message body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferStatusBody {
    /// Group header
    #[serde(rename = "GrpHdr")]
    pub group_header: GroupHeader,
    /// Status details referencing the original transfer
    #[serde(rename = "TxInfAndSts")]
    pub status_info: StatusInfo,
}

/// Group header, common to all kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupHeader {
    /// Message identifier
    #[serde(rename = "MsgId")]
    pub message_id: String,
    /// Message creation timestamp (RFC 3339 string, passed through verbatim)
    #[serde(rename = "CreDtTm")]
    pub created_at: String,
}

/// Payment information block shared by quote and quote reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInfo {
    /// Payment information identifier
    #[serde(rename = "PmtInfId")]
    pub payment_info_id: String,
    /// Debtor party
    #[serde(rename = "Dbtr")]
    pub debtor: Party,
    /// Debtor account
    #[serde(rename = "DbtrAcct")]
    pub debtor_account: Account,
    /// Debtor agent (clearing-system member)
    #[serde(rename = "DbtrAgt")]
    pub debtor_agent: Agent,
    /// Credit transfer details
    #[serde(rename = "CdtTrfTxInf")]
    pub credit_transfer: CreditTransfer,
}

/// Credit transfer details for quote and quote reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransfer {
    /// Payment identifiers
    #[serde(rename = "PmtId")]
    pub payment_id: PaymentId,
    /// Instructed amount wrapper
    #[serde(rename = "Amt")]
    pub amount: AmountChoice,
    /// Creditor party
    #[serde(rename = "Cdtr")]
    pub creditor: Party,
    /// Creditor account
    #[serde(rename = "CdtrAcct")]
    pub creditor_account: Account,
    /// Creditor agent (clearing-system member)
    #[serde(rename = "CdtrAgt")]
    pub creditor_agent: Agent,
}

/// Credit transfer details for pacs.008, where debtor and creditor sit
/// alongside the payment identifiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCreditTransfer {
    /// Payment identifiers
    #[serde(rename = "PmtId")]
    pub payment_id: TransferPaymentId,
    /// Instructed amount
    #[serde(rename = "InstdAmt")]
    pub instructed_amount: InstructedAmount,
    /// Debtor party
    #[serde(rename = "Dbtr")]
    pub debtor: Party,
    /// Debtor account
    #[serde(rename = "DbtrAcct")]
    pub debtor_account: Account,
    /// Debtor agent
    #[serde(rename = "DbtrAgt")]
    pub debtor_agent: Agent,
    /// Creditor party
    #[serde(rename = "Cdtr")]
    pub creditor: Party,
    /// Creditor account
    #[serde(rename = "CdtrAcct")]
    pub creditor_account: Account,
    /// Creditor agent
    #[serde(rename = "CdtrAgt")]
    pub creditor_agent: Agent,
}

/// Payment identifiers for quote and quote reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentId {
    /// End-to-end identifier shared by every message in the flow
    #[serde(rename = "EndToEndId")]
    pub end_to_end_id: String,
}

/// Payment identifiers for pacs.008
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferPaymentId {
    /// Instruction identifier; stands in for the payment-info id on transfers
    #[serde(rename = "InstrId")]
    pub instruction_id: String,
    /// End-to-end identifier shared by every message in the flow
    #[serde(rename = "EndToEndId")]
    pub end_to_end_id: String,
}

/// Status details referencing the original transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    /// Original instruction identifier
    #[serde(rename = "OrgnlInstrId")]
    pub original_instruction_id: String,
    /// Original end-to-end identifier
    #[serde(rename = "OrgnlEndToEndId")]
    pub original_end_to_end_id: String,
    /// Transaction status code
    #[serde(rename = "TxSts")]
    pub status: String,
}

/// Amount wrapper as nested in pain.001/pain.013
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmountChoice {
    /// Instructed amount
    #[serde(rename = "InstdAmt")]
    pub instructed: InstructedAmount,
}

/// Instructed amount
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructedAmount {
    /// Monetary amount
    #[serde(rename = "Amt")]
    pub amount: MonetaryAmount,
}

/// Monetary amount with currency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonetaryAmount {
    /// Numeric value
    #[serde(rename = "Amt")]
    pub value: f64,
    /// ISO currency code
    #[serde(rename = "Ccy")]
    pub currency: String,
}

/// A transacting party
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    /// Party identification
    #[serde(rename = "Id")]
    pub id: PartyId,
}

/// Party identification wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyId {
    /// Private identification
    #[serde(rename = "PrvtId")]
    pub private_id: PrivateId,
}

/// Private identification wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateId {
    /// Scheme-qualified identifier
    #[serde(rename = "Othr")]
    pub other: OtherId,
}

/// Scheme-qualified identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtherId {
    /// The identifier value
    #[serde(rename = "Id")]
    pub id: String,
    /// Identification scheme
    #[serde(rename = "SchmeNm", skip_serializing_if = "Option::is_none")]
    pub scheme: Option<SchemeName>,
}

/// An account held by a party
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Account identification
    #[serde(rename = "Id")]
    pub id: AccountId,
}

/// Account identification wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountId {
    /// Scheme-qualified account identifier
    #[serde(rename = "Othr")]
    pub other: OtherAccountId,
}

/// Scheme-qualified account identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtherAccountId {
    /// The account identifier value
    #[serde(rename = "Id")]
    pub id: String,
    /// Identification scheme (proprietary code feeds the identity hasher)
    #[serde(rename = "SchmeNm")]
    pub scheme: SchemeName,
}

/// Identification scheme name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemeName {
    /// Proprietary scheme code
    #[serde(rename = "Prtry")]
    pub proprietary: String,
}

/// Financial agent (clearing-system member)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Financial institution identification
    #[serde(rename = "FinInstnId")]
    pub institution: InstitutionId,
}

/// Financial institution identification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstitutionId {
    /// Clearing-system member identification
    #[serde(rename = "ClrSysMmbId")]
    pub clearing_member: ClearingMember,
}

/// Clearing-system member identification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearingMember {
    /// Member identifier
    #[serde(rename = "MmbId")]
    pub member_id: String,
}

/// Supplementary data envelope (quote only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplementaryData {
    /// Envelope
    #[serde(rename = "Envlp")]
    pub envelope: Envelope,
}

/// Supplementary data envelope body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Document
    #[serde(rename = "Doc")]
    pub document: EnvelopeDocument,
}

/// Supplementary document carrying the initiating party
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeDocument {
    /// Initiating party details
    #[serde(rename = "InitgPty", skip_serializing_if = "Option::is_none")]
    pub initiating_party: Option<InitiatingParty>,
}

/// Initiating party supplementary details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatingParty {
    /// Geolocation at initiation
    #[serde(rename = "Glctn", skip_serializing_if = "Option::is_none")]
    pub geolocation: Option<Geolocation>,
}

/// Geolocation of the initiating party
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geolocation {
    /// Latitude, passed through as received
    #[serde(rename = "Lat")]
    pub lat: String,
    /// Longitude, passed through as received
    #[serde(rename = "Long")]
    pub long: String,
}

/// The three fields feeding the identity hasher for one side of a payment
#[derive(Debug, Clone, Copy)]
pub struct AccountKey<'a> {
    /// Clearing-system member id of the party's agent
    pub member_id: &'a str,
    /// Account identifier
    pub account_id: &'a str,
    /// Proprietary scheme code of the account identification
    pub scheme: &'a str,
}

impl PaymentInfo {
    /// Hasher inputs for the debtor side
    pub fn debtor_key(&self) -> AccountKey<'_> {
        AccountKey {
            member_id: &self.debtor_agent.institution.clearing_member.member_id,
            account_id: &self.debtor_account.id.other.id,
            scheme: &self.debtor_account.id.other.scheme.proprietary,
        }
    }

    /// Hasher inputs for the creditor side
    pub fn creditor_key(&self) -> AccountKey<'_> {
        AccountKey {
            member_id: &self
                .credit_transfer
                .creditor_agent
                .institution
                .clearing_member
                .member_id,
            account_id: &self.credit_transfer.creditor_account.id.other.id,
            scheme: &self.credit_transfer.creditor_account.id.other.scheme.proprietary,
        }
    }

    /// Raw debtor party identifier
    pub fn debtor_party_id(&self) -> &str {
        &self.debtor.id.private_id.other.id
    }

    /// Raw creditor party identifier
    pub fn creditor_party_id(&self) -> &str {
        &self.credit_transfer.creditor.id.private_id.other.id
    }
}

impl TransferCreditTransfer {
    /// Hasher inputs for the debtor side
    pub fn debtor_key(&self) -> AccountKey<'_> {
        AccountKey {
            member_id: &self.debtor_agent.institution.clearing_member.member_id,
            account_id: &self.debtor_account.id.other.id,
            scheme: &self.debtor_account.id.other.scheme.proprietary,
        }
    }

    /// Hasher inputs for the creditor side
    pub fn creditor_key(&self) -> AccountKey<'_> {
        AccountKey {
            member_id: &self.creditor_agent.institution.clearing_member.member_id,
            account_id: &self.creditor_account.id.other.id,
            scheme: &self.creditor_account.id.other.scheme.proprietary,
        }
    }
}

impl QuoteBody {
    /// Geolocation of the initiating party, when supplied
    pub fn geolocation(&self) -> Option<&Geolocation> {
        self.supplementary
            .as_ref()?
            .envelope
            .document
            .initiating_party
            .as_ref()?
            .geolocation
            .as_ref()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures;
    use super::*;

    #[test]
    fn test_quote_deserializes() {
        let PaymentMessage::Quote(quote) = fixtures::quote() else {
            panic!("expected quote variant");
        };
        let info = &quote.body.payment_info;
        assert_eq!(
            info.credit_transfer.payment_id.end_to_end_id,
            fixtures::QUOTE_END_TO_END_ID
        );
        assert_eq!(info.debtor_party_id(), "+36-432226947");
        assert_eq!(info.creditor_party_id(), "+42-966969344");

        let debtor = info.debtor_key();
        assert_eq!(debtor.member_id, "typolog028");
        assert_eq!(debtor.account_id, "+36-432226947");
        assert_eq!(debtor.scheme, "MSISDN");

        let creditor = info.creditor_key();
        assert_eq!(creditor.member_id, "dfsp002");
        assert_eq!(creditor.account_id, "+42-966969344");
        assert_eq!(creditor.scheme, "MSISDN");

        assert_eq!(info.credit_transfer.amount.instructed.amount.value, 31020.89);
        assert_eq!(info.credit_transfer.amount.instructed.amount.currency, "USD");

        let geo = quote.body.geolocation().expect("geolocation");
        assert_eq!(geo.lat, "-3,1609");
        assert_eq!(geo.long, "38,3588");
    }

    #[test]
    fn test_transfer_deserializes() {
        let PaymentMessage::Transfer(transfer) = fixtures::transfer() else {
            panic!("expected transfer variant");
        };
        let ct = &transfer.body.credit_transfer;
        assert_eq!(
            ct.payment_id.end_to_end_id,
            fixtures::TRANSFER_END_TO_END_ID
        );
        assert_eq!(ct.payment_id.instruction_id, "4ca819baa65d4a2c9e062f2055525046");
        assert_eq!(ct.instructed_amount.amount.value, 9000.0);
        assert_eq!(ct.instructed_amount.amount.currency, "ZAR");
        assert_eq!(ct.debtor_key().member_id, "typology003");
        assert_eq!(ct.creditor_key().member_id, "dfsp002");
    }

    #[test]
    fn test_transfer_status_deserializes() {
        let PaymentMessage::TransferStatus(status) = fixtures::transfer_status() else {
            panic!("expected transfer-status variant");
        };
        let info = &status.body.status_info;
        assert_eq!(info.original_end_to_end_id, fixtures::TRANSFER_END_TO_END_ID);
        assert_eq!(info.original_instruction_id, "5d158d92f70142a6ac7ffba30ac6c2db");
        assert_eq!(info.status, "ACCC");
    }

    #[test]
    fn test_kind_tags_round_trip() {
        for (msg, kind) in [
            (fixtures::quote(), "pain.001.001.11"),
            (fixtures::quote_reply(), "pain.013.001.09"),
            (fixtures::transfer(), "pacs.008.001.10"),
            (fixtures::transfer_status(), "pacs.002.001.12"),
        ] {
            assert_eq!(msg.kind(), kind);
            let json = serde_json::to_value(&msg).unwrap();
            assert_eq!(json["TxTp"], kind);
        }
    }

    #[test]
    fn test_stamps_serialize_with_wire_names() {
        let PaymentMessage::Quote(mut quote) = fixtures::quote() else {
            panic!("expected quote variant");
        };
        quote.end_to_end_id = Some(fixtures::QUOTE_END_TO_END_ID.to_string());
        quote.prcg_tm = Some(12.5);
        quote.data_cache = Some(DataCache {
            creditor_party_id: "+42-966969344".to_string(),
            debtor_party_id: "+36-432226947".to_string(),
            creditor_account_hash: fixtures::CREDITOR_ACCOUNT_HASH.to_string(),
            debtor_account_hash: fixtures::DEBTOR_ACCOUNT_HASH.to_string(),
        });

        let json = serde_json::to_value(&quote).unwrap();
        assert_eq!(json["EndToEndId"], fixtures::QUOTE_END_TO_END_ID);
        assert_eq!(json["prcgTm"], 12.5);
        assert_eq!(
            json["DataCache"]["creditorAccountHash"],
            fixtures::CREDITOR_ACCOUNT_HASH
        );
        assert_eq!(json["DataCache"]["dbtrId"], serde_json::Value::Null);
        assert_eq!(json["DataCache"]["debtorPartyId"], "+36-432226947");
    }

    #[test]
    fn test_unstamped_fields_stay_absent() {
        let json = serde_json::to_value(fixtures::quote()).unwrap();
        assert!(json.get("DataCache").is_none());
        assert!(json.get("prcgTm").is_none());
    }
}
