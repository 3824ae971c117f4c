//! Classification Rule Table
//!
//! Ordered, declarative, first match wins. Keep the ordering deliberate:
//! declined auths outrank everything, money-request context outranks the
//! raw transaction type, card rules outrank the transfer family, and the
//! transfer family is checked most-specific first (check deposit and
//! shopify payout before generic ACH).

use crate::notification::{CodeType, TransactionType};
use crate::resolve::PaymentMethod;

use super::{ActivityType, ClassifyInput};

/// Free-text marker the bank stamps on check deposit credits
pub const CHECK_DEPOSIT_PATTERN: &str = "Check Deposit";

/// Payout partner recognized by counterparty-name equality
pub const SHOPIFY_PARTNER_NAME: &str = "Shopify";

/// Free-text marker on the zero-amount row created at account opening
pub const ACCOUNT_ORIGINATION_PATTERN: &str = "Account Origination";

/// One row of the table
pub struct Rule {
    pub name: &'static str,
    pub applies: fn(&ClassifyInput<'_>) -> bool,
    pub activity_type: ActivityType,
}

fn request_method(input: &ClassifyInput<'_>) -> Option<PaymentMethod> {
    input
        .context
        .and_then(|ctx| ctx.request.as_ref())
        .map(|request| request.method)
}

fn description_contains(input: &ClassifyInput<'_>, pattern: &str) -> bool {
    input
        .description
        .map(|desc| desc.contains(pattern))
        .unwrap_or(false)
}

/// The table. Evaluated top-down by [`super::classify`].
pub static RULES: &[Rule] = &[
    Rule {
        name: "card_declined",
        applies: |input| *input.code_type == CodeType::AuthDeclined,
        activity_type: ActivityType::CardDeclined,
    },
    Rule {
        // Releases never reach users; the activity entry still records them
        name: "reversal",
        applies: |input| input.code_type.is_release(),
        activity_type: ActivityType::TransferReversed,
    },
    Rule {
        name: "money_request_pos",
        applies: |input| request_method(input) == Some(PaymentMethod::PointOfSale),
        activity_type: ActivityType::MoneyRequestPos,
    },
    Rule {
        name: "money_request_card_online",
        applies: |input| request_method(input) == Some(PaymentMethod::CardOnline),
        activity_type: ActivityType::MoneyRequestCardOnline,
    },
    Rule {
        name: "money_request_bank_online",
        applies: |input| request_method(input) == Some(PaymentMethod::BankOnline),
        activity_type: ActivityType::MoneyRequestBankOnline,
    },
    Rule {
        name: "monthly_interest",
        applies: |input| {
            *input.transaction_type == TransactionType::Interest
                || input.context.map(|ctx| ctx.monthly_interest).unwrap_or(false)
        },
        activity_type: ActivityType::InterestPayment,
    },
    Rule {
        name: "fee",
        applies: |input| *input.transaction_type == TransactionType::Fee,
        activity_type: ActivityType::FeeCharged,
    },
    Rule {
        name: "card_refund",
        applies: |input| input.has_card_leg && *input.transaction_type == TransactionType::Refund,
        activity_type: ActivityType::CardRefund,
    },
    Rule {
        name: "visa_credit",
        applies: |input| *input.transaction_type == TransactionType::VisaCredit,
        activity_type: ActivityType::VisaCredit,
    },
    Rule {
        name: "card_atm",
        applies: |input| input.has_card_leg && *input.transaction_type == TransactionType::Atm,
        activity_type: ActivityType::CardAtmWithdrawal,
    },
    Rule {
        name: "card_purchase_pos",
        applies: |input| input.has_card_leg && input.entry_mode == Some("POS"),
        activity_type: ActivityType::CardPurchase,
    },
    Rule {
        // Card leg with any other entry mode is card-not-present
        name: "card_purchase_online",
        applies: |input| input.has_card_leg,
        activity_type: ActivityType::CardOnlinePurchase,
    },
    Rule {
        name: "account_origination",
        applies: |input| {
            input.amount.is_zero() && description_contains(input, ACCOUNT_ORIGINATION_PATTERN)
        },
        activity_type: ActivityType::AccountOrigination,
    },
    Rule {
        name: "check_deposit",
        applies: |input| description_contains(input, CHECK_DEPOSIT_PATTERN),
        activity_type: ActivityType::CheckDeposit,
    },
    Rule {
        name: "shopify_payout",
        applies: |input| input.counterparty == SHOPIFY_PARTNER_NAME,
        activity_type: ActivityType::ShopifyPayout,
    },
    Rule {
        name: "internal_transfer",
        applies: |input| input.context.map(|ctx| ctx.is_internal()).unwrap_or(false),
        activity_type: ActivityType::InternalTransfer,
    },
    Rule {
        name: "wire_deposit",
        applies: |input| *input.transaction_type == TransactionType::Wire,
        activity_type: ActivityType::WireDeposit,
    },
    Rule {
        name: "ach_transfer",
        applies: |input| *input.transaction_type == TransactionType::Ach || input.has_transfer,
        activity_type: ActivityType::AchTransfer,
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use rust_decimal::Decimal;

    fn input<'a>(
        transaction_type: &'a TransactionType,
        code_type: &'a CodeType,
    ) -> ClassifyInput<'a> {
        ClassifyInput {
            transaction_type,
            code_type,
            amount: Money::usd(Decimal::TEN),
            has_card_leg: false,
            entry_mode: None,
            description: None,
            counterparty: "",
            context: None,
            has_transfer: false,
        }
    }

    fn first_match(input: &ClassifyInput<'_>) -> Option<&'static str> {
        RULES.iter().find(|rule| (rule.applies)(input)).map(|r| r.name)
    }

    #[test]
    fn test_rule_names_are_unique() {
        let mut names: Vec<_> = RULES.iter().map(|r| r.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RULES.len());
    }

    #[test]
    fn test_card_rules_outrank_transfer_family() {
        let txn_type = TransactionType::Ach;
        let code = CodeType::DebitPosted;
        let mut i = input(&txn_type, &code);
        i.has_card_leg = true;
        i.entry_mode = Some("POS");
        assert_eq!(first_match(&i), Some("card_purchase_pos"));
    }

    #[test]
    fn test_check_deposit_outranks_ach() {
        let txn_type = TransactionType::Ach;
        let code = CodeType::CreditPosted;
        let mut i = input(&txn_type, &code);
        i.description = Some("Check Deposit 9921");
        assert_eq!(first_match(&i), Some("check_deposit"));
    }

    #[test]
    fn test_zero_amount_origination() {
        let txn_type = TransactionType::Ach;
        let code = CodeType::CreditPosted;
        let mut i = input(&txn_type, &code);
        i.amount = Money::usd(Decimal::ZERO);
        i.description = Some("Account Origination");
        assert_eq!(first_match(&i), Some("account_origination"));
    }

    #[test]
    fn test_no_rule_for_unknown_type() {
        let txn_type = TransactionType::Other("loan".into());
        let code = CodeType::CreditPosted;
        assert_eq!(first_match(&input(&txn_type, &code)), None);
    }
}
