// [libs/domain/models/src/ledger.rs]

use chrono::{DateTime, Utc};
use hive_core_credits::CreditAmount;
use serde::{Deserialize, Serialize};

/// Conjunto cerrado de tipos de abono (monto positivo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditKind {
    SignupGrant,
    Purchase,
    Bounty,
    Referral,
    Promo,
    CommunityDividend,
    AffiliateBonus,
    AffiliateMatch,
}

/// Conjunto cerrado de tipos de cargo (monto negativo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebitKind {
    BotRuntime,
    AdapterUsage,
    Addon,
    Refund,
    Correction,
    ResourceUpgrade,
    StorageUpgrade,
    OnboardingLlm,
}

/// Discriminante unificado persistido en la columna `type` del Ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransactionKind {
    Credit(CreditKind),
    Debit(DebitKind),
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Credit(CreditKind::SignupGrant) => "signup_grant",
            TransactionKind::Credit(CreditKind::Purchase) => "purchase",
            TransactionKind::Credit(CreditKind::Bounty) => "bounty",
            TransactionKind::Credit(CreditKind::Referral) => "referral",
            TransactionKind::Credit(CreditKind::Promo) => "promo",
            TransactionKind::Credit(CreditKind::CommunityDividend) => "community_dividend",
            TransactionKind::Credit(CreditKind::AffiliateBonus) => "affiliate_bonus",
            TransactionKind::Credit(CreditKind::AffiliateMatch) => "affiliate_match",
            TransactionKind::Debit(DebitKind::BotRuntime) => "bot_runtime",
            TransactionKind::Debit(DebitKind::AdapterUsage) => "adapter_usage",
            TransactionKind::Debit(DebitKind::Addon) => "addon",
            TransactionKind::Debit(DebitKind::Refund) => "refund",
            TransactionKind::Debit(DebitKind::Correction) => "correction",
            TransactionKind::Debit(DebitKind::ResourceUpgrade) => "resource_upgrade",
            TransactionKind::Debit(DebitKind::StorageUpgrade) => "storage_upgrade",
            TransactionKind::Debit(DebitKind::OnboardingLlm) => "onboarding_llm",
        }
    }

    pub fn parse(label: &str) -> Option<TransactionKind> {
        let kind = match label {
            "signup_grant" => TransactionKind::Credit(CreditKind::SignupGrant),
            "purchase" => TransactionKind::Credit(CreditKind::Purchase),
            "bounty" => TransactionKind::Credit(CreditKind::Bounty),
            "referral" => TransactionKind::Credit(CreditKind::Referral),
            "promo" => TransactionKind::Credit(CreditKind::Promo),
            "community_dividend" => TransactionKind::Credit(CreditKind::CommunityDividend),
            "affiliate_bonus" => TransactionKind::Credit(CreditKind::AffiliateBonus),
            "affiliate_match" => TransactionKind::Credit(CreditKind::AffiliateMatch),
            "bot_runtime" => TransactionKind::Debit(DebitKind::BotRuntime),
            "adapter_usage" => TransactionKind::Debit(DebitKind::AdapterUsage),
            "addon" => TransactionKind::Debit(DebitKind::Addon),
            "refund" => TransactionKind::Debit(DebitKind::Refund),
            "correction" => TransactionKind::Debit(DebitKind::Correction),
            "resource_upgrade" => TransactionKind::Debit(DebitKind::ResourceUpgrade),
            "storage_upgrade" => TransactionKind::Debit(DebitKind::StorageUpgrade),
            "onboarding_llm" => TransactionKind::Debit(DebitKind::OnboardingLlm),
            _ => return None,
        };
        Some(kind)
    }
}

/// Fila inmutable del registro append-only de transacciones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransactionRecord {
    #[serde(rename = "transaction_identifier")]
    pub id: String,

    #[serde(rename = "tenant_identifier")]
    pub tenant_id: String,

    /// Magnitud con signo: positiva para abonos, negativa para cargos.
    #[serde(rename = "amount_raw")]
    pub amount: CreditAmount,

    /// Balance del tenant inmediatamente después de aplicar esta fila.
    #[serde(rename = "balance_after_raw")]
    pub balance_after: CreditAmount,

    #[serde(rename = "transaction_kind")]
    pub kind: String,

    pub description: Option<String>,

    /// Llave de idempotencia globalmente única cuando está presente.
    #[serde(rename = "reference_identifier")]
    pub reference_id: Option<String>,

    pub funding_source: Option<String>,

    /// Usuario del tenant al que se atribuye el consumo.
    pub attributed_user_id: Option<String>,

    #[serde(rename = "created_at_utc")]
    pub created_at: DateTime<Utc>,
}

/// Snapshot del balance vivo de un tenant (a lo sumo una fila por tenant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditBalanceSnapshot {
    #[serde(rename = "tenant_identifier")]
    pub tenant_id: String,
    #[serde(rename = "amount_raw")]
    pub amount: CreditAmount,
    #[serde(rename = "last_updated_utc")]
    pub last_updated: DateTime<Utc>,
}

/// Agregado de consumo por miembro del tenant (transacciones negativas).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberUsageAggregate {
    pub attributed_user_id: String,
    #[serde(rename = "total_debit_raw")]
    pub total_debit: CreditAmount,
    pub transaction_count: u64,
}
