//! Transaction Classifier
//!
//! Pure decision logic: (transaction type, code type, resolved context) in,
//! activity classification + counterparty + message out. No I/O happens
//! here; everything the rules look at was fetched by the resolver.
//!
//! Classification is an ordered rule table ([`rules::RULES`]) evaluated
//! top-down, first match wins. A combination no rule claims is an explicit
//! error, never a guess.

pub mod counterparty;
pub mod rules;

use std::fmt;

use crate::error::UnhandledClassification;
use crate::money::Money;
use crate::notification::{CodeType, TransactionType};
use crate::reconcile::TransactionSubtype;
use crate::resolve::TransferContext;

pub use counterparty::extract_counterparty;

/// Closed set of user-facing activity kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityType {
    CardPurchase,
    CardAtmWithdrawal,
    CardOnlinePurchase,
    CardRefund,
    CardDeclined,
    VisaCredit,
    FeeCharged,
    InternalTransfer,
    AchTransfer,
    WireDeposit,
    CheckDeposit,
    ShopifyPayout,
    MoneyRequestPos,
    MoneyRequestCardOnline,
    MoneyRequestBankOnline,
    InterestPayment,
    AccountOrigination,
    TransferReversed,
}

impl ActivityType {
    /// Subtype stamped onto Posted rows for this activity kind
    pub fn subtype(&self) -> TransactionSubtype {
        match self {
            ActivityType::CardPurchase => TransactionSubtype::CardPurchase,
            ActivityType::CardAtmWithdrawal => TransactionSubtype::CardAtm,
            ActivityType::CardOnlinePurchase => TransactionSubtype::CardOnline,
            ActivityType::CardRefund => TransactionSubtype::CardRefund,
            ActivityType::CardDeclined => TransactionSubtype::CardPurchase,
            ActivityType::VisaCredit => TransactionSubtype::VisaCredit,
            ActivityType::FeeCharged => TransactionSubtype::Fee,
            ActivityType::InternalTransfer => TransactionSubtype::InternalTransfer,
            ActivityType::AchTransfer => TransactionSubtype::AchTransfer,
            ActivityType::WireDeposit => TransactionSubtype::WireDeposit,
            ActivityType::CheckDeposit => TransactionSubtype::CheckDeposit,
            ActivityType::ShopifyPayout => TransactionSubtype::ShopifyPayout,
            ActivityType::MoneyRequestPos
            | ActivityType::MoneyRequestCardOnline
            | ActivityType::MoneyRequestBankOnline => TransactionSubtype::MoneyRequest,
            ActivityType::InterestPayment => TransactionSubtype::Interest,
            ActivityType::AccountOrigination => TransactionSubtype::AccountOrigination,
            ActivityType::TransferReversed => TransactionSubtype::Reversal,
        }
    }

    /// Short human title used in the activity stream
    pub fn title(&self) -> &'static str {
        match self {
            ActivityType::CardPurchase => "Card purchase",
            ActivityType::CardAtmWithdrawal => "ATM withdrawal",
            ActivityType::CardOnlinePurchase => "Online card purchase",
            ActivityType::CardRefund => "Refund",
            ActivityType::CardDeclined => "Card declined",
            ActivityType::VisaCredit => "Visa credit",
            ActivityType::FeeCharged => "Fee",
            ActivityType::InternalTransfer => "Internal transfer",
            ActivityType::AchTransfer => "ACH transfer",
            ActivityType::WireDeposit => "Wire deposit",
            ActivityType::CheckDeposit => "Check deposit",
            ActivityType::ShopifyPayout => "Shopify payout",
            ActivityType::MoneyRequestPos
            | ActivityType::MoneyRequestCardOnline
            | ActivityType::MoneyRequestBankOnline => "Payment received",
            ActivityType::InterestPayment => "Interest payment",
            ActivityType::AccountOrigination => "Account opened",
            ActivityType::TransferReversed => "Transfer reversed",
        }
    }

    /// Template selector keys. Only the selection rule matters here; the
    /// template store owns the wording.
    pub fn template(&self) -> TemplateSelector {
        TemplateSelector {
            title: self.template_key("title"),
            header: self.template_key("header"),
            body: self.template_key("body"),
        }
    }

    fn template_key(&self, part: &'static str) -> String {
        format!("activity.{}.{}", self.key(), part)
    }

    fn key(&self) -> &'static str {
        match self {
            ActivityType::CardPurchase => "card_purchase",
            ActivityType::CardAtmWithdrawal => "card_atm_withdrawal",
            ActivityType::CardOnlinePurchase => "card_online_purchase",
            ActivityType::CardRefund => "card_refund",
            ActivityType::CardDeclined => "card_declined",
            ActivityType::VisaCredit => "visa_credit",
            ActivityType::FeeCharged => "fee_charged",
            ActivityType::InternalTransfer => "internal_transfer",
            ActivityType::AchTransfer => "ach_transfer",
            ActivityType::WireDeposit => "wire_deposit",
            ActivityType::CheckDeposit => "check_deposit",
            ActivityType::ShopifyPayout => "shopify_payout",
            ActivityType::MoneyRequestPos => "money_request_pos",
            ActivityType::MoneyRequestCardOnline => "money_request_card_online",
            ActivityType::MoneyRequestBankOnline => "money_request_bank_online",
            ActivityType::InterestPayment => "interest_payment",
            ActivityType::AccountOrigination => "account_origination",
            ActivityType::TransferReversed => "transfer_reversed",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Which templates to render for an activity entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSelector {
    pub title: String,
    pub header: String,
    pub body: String,
}

/// Derived, ephemeral projection that decorates a ledger mutation and
/// feeds the Side-Effect Coordinator. Never persisted as an entity.
#[derive(Debug, Clone)]
pub struct ActivityMessage {
    pub activity_type: ActivityType,
    pub counterparty: String,
    pub title: String,
    pub description: String,
    pub notification_header: String,
    pub notification_body: String,
}

/// Everything a rule may look at. Assembled by the dispatcher from the
/// payload and resolver output.
#[derive(Debug, Clone)]
pub struct ClassifyInput<'a> {
    pub transaction_type: &'a TransactionType,
    pub code_type: &'a CodeType,
    pub amount: Money,
    pub has_card_leg: bool,
    /// Point-of-sale entry mode from the card leg
    pub entry_mode: Option<&'a str>,
    pub description: Option<&'a str>,
    /// Resolved counterparty (contact record preferred, else extracted)
    pub counterparty: &'a str,
    pub context: Option<&'a TransferContext>,
    /// A money-transfer id is attached to the event
    pub has_transfer: bool,
}

/// Classifier output
#[derive(Debug, Clone)]
pub struct Classification {
    pub activity_type: ActivityType,
    pub subtype: TransactionSubtype,
    pub template: TemplateSelector,
    pub message: ActivityMessage,
}

/// Resolve the counterparty name: linked contact first, then the free-text
/// extraction heuristic, then the card merchant name.
pub fn resolve_counterparty(
    context: Option<&TransferContext>,
    description: Option<&str>,
    merchant_name: Option<&str>,
) -> String {
    if let Some(contact) = context.and_then(|ctx| ctx.contact.as_ref()) {
        return contact.name.clone();
    }
    if let Some(name) = description.and_then(extract_counterparty) {
        return name;
    }
    merchant_name.unwrap_or_default().to_string()
}

/// Run the rule table over one input. First match wins; no match is an
/// explicit error (distinct from the dispatcher's unknown-route no-op).
pub fn classify(input: &ClassifyInput<'_>) -> Result<Classification, UnhandledClassification> {
    let Some(rule) = rules::RULES.iter().find(|rule| (rule.applies)(input)) else {
        return Err(UnhandledClassification {
            transaction_type: input.transaction_type.to_string(),
            code_type: input.code_type.to_string(),
        });
    };

    let activity_type = rule.activity_type;
    let title = activity_type.title().to_string();
    let body = if input.counterparty.is_empty() {
        format!("{} {}", title, input.amount)
    } else {
        format!("{}: {} {}", title, input.counterparty, input.amount)
    };

    Ok(Classification {
        activity_type,
        subtype: activity_type.subtype(),
        template: activity_type.template(),
        message: ActivityMessage {
            activity_type,
            counterparty: input.counterparty.to_string(),
            title: title.clone(),
            description: body.clone(),
            notification_header: title,
            notification_body: body,
        },
    })
}
