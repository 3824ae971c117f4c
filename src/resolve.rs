//! Correlation Resolver
//!
//! Turns the envelope's identifiers into the business entities classification
//! needs: the owning business, and (for money movement) the linked transfer
//! context. All I/O for a notification happens here, through the directory
//! traits; the classifier downstream is pure.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ResolveError;
use crate::notification::EntityType;

/// Owning business (and user, when the bank entity is a consumer)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub business_id: String,
    pub user_id: Option<String>,
}

/// Contact record linked to a money transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: String,
    pub name: String,
}

/// How a money request was paid, as recorded on the linked request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    PointOfSale,
    CardOnline,
    BankOnline,
}

/// Payment/invoice request linked to a money transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub id: String,
    pub method: PaymentMethod,
}

/// Context resolved once per notification; drives classification only,
/// never persisted as a ledger entity.
#[derive(Debug, Clone, Default)]
pub struct TransferContext {
    pub money_transfer_id: String,
    pub contact: Option<Contact>,
    pub request: Option<PaymentRequest>,
    /// Transfer is the monthly interest payout
    pub monthly_interest: bool,
}

impl TransferContext {
    /// A transfer with no contact and no request moves money between the
    /// business's own accounts.
    pub fn is_internal(&self) -> bool {
        self.contact.is_none() && self.request.is_none() && !self.monthly_interest
    }
}

/// Account/card directory collaborator (bank-issued identifiers in,
/// business entities out)
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Owning business/user for a consumer entity; `account_id`
    /// disambiguates when the consumer spans several accounts.
    async fn consumer_owner(
        &self,
        entity_id: &str,
        account_id: Option<&str>,
    ) -> Result<Option<Owner>, ResolveError>;
}

/// Transfer directory collaborator (money transfer / contact / request)
#[async_trait]
pub trait TransferDirectory: Send + Sync {
    async fn transfer_context(
        &self,
        money_transfer_id: &str,
    ) -> Result<Option<TransferContext>, ResolveError>;
}

/// Resolver over the two directories
pub struct CorrelationResolver {
    accounts: Arc<dyn AccountDirectory>,
    transfers: Arc<dyn TransferDirectory>,
}

impl CorrelationResolver {
    pub fn new(accounts: Arc<dyn AccountDirectory>, transfers: Arc<dyn TransferDirectory>) -> Self {
        Self {
            accounts,
            transfers,
        }
    }

    /// Resolve the owning business for an envelope.
    ///
    /// business entities own themselves; consumers resolve through the
    /// account directory; member entities are not supported. A missing
    /// owner is fatal: there is nobody to attribute the ledger row to.
    pub async fn resolve_owner(
        &self,
        entity_id: &str,
        entity_type: EntityType,
        account_id: Option<&str>,
    ) -> Result<Owner, ResolveError> {
        match entity_type {
            EntityType::Business => Ok(Owner {
                business_id: entity_id.to_string(),
                user_id: None,
            }),
            EntityType::Consumer => self
                .accounts
                .consumer_owner(entity_id, account_id)
                .await?
                .ok_or_else(|| ResolveError::OwnerNotFound {
                    entity_id: entity_id.to_string(),
                    entity_type: entity_type.as_str().to_string(),
                }),
            EntityType::Member => Err(ResolveError::UnsupportedEntityType(
                entity_type.as_str().to_string(),
            )),
        }
    }

    /// Resolve transfer context when the payload carries a money-transfer
    /// id. An unknown transfer id is not fatal: the event still reconciles,
    /// it just classifies without contact/request context.
    pub async fn transfer_context(
        &self,
        money_transfer_id: Option<&str>,
    ) -> Result<Option<TransferContext>, ResolveError> {
        match money_transfer_id {
            Some(id) => self.transfers.transfer_context(id).await,
            None => Ok(None),
        }
    }
}

pub mod testutil {
    //! Directory fakes, used by tests and by local stdin-replay wiring
    //! where no real directories are configured

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeAccountDirectory {
        owners: Mutex<HashMap<String, Owner>>,
    }

    impl FakeAccountDirectory {
        pub fn with_owner(entity_id: &str, owner: Owner) -> Self {
            let dir = Self::default();
            dir.owners
                .lock()
                .expect("directory lock")
                .insert(entity_id.to_string(), owner);
            dir
        }
    }

    #[async_trait]
    impl AccountDirectory for FakeAccountDirectory {
        async fn consumer_owner(
            &self,
            entity_id: &str,
            _account_id: Option<&str>,
        ) -> Result<Option<Owner>, ResolveError> {
            Ok(self.owners.lock().expect("directory lock").get(entity_id).cloned())
        }
    }

    #[derive(Default)]
    pub struct FakeTransferDirectory {
        contexts: Mutex<HashMap<String, TransferContext>>,
    }

    impl FakeTransferDirectory {
        pub fn insert(&self, ctx: TransferContext) {
            self.contexts
                .lock()
                .expect("directory lock")
                .insert(ctx.money_transfer_id.clone(), ctx);
        }
    }

    #[async_trait]
    impl TransferDirectory for FakeTransferDirectory {
        async fn transfer_context(
            &self,
            money_transfer_id: &str,
        ) -> Result<Option<TransferContext>, ResolveError> {
            Ok(self
                .contexts
                .lock()
                .expect("directory lock")
                .get(money_transfer_id)
                .cloned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{FakeAccountDirectory, FakeTransferDirectory};
    use super::*;

    fn resolver_with(accounts: FakeAccountDirectory) -> CorrelationResolver {
        CorrelationResolver::new(Arc::new(accounts), Arc::new(FakeTransferDirectory::default()))
    }

    #[tokio::test]
    async fn test_business_owns_itself() {
        let resolver = resolver_with(FakeAccountDirectory::default());
        let owner = resolver
            .resolve_owner("BZ-55", EntityType::Business, None)
            .await
            .unwrap();
        assert_eq!(owner.business_id, "BZ-55");
        assert!(owner.user_id.is_none());
    }

    #[tokio::test]
    async fn test_consumer_resolves_via_directory() {
        let accounts = FakeAccountDirectory::with_owner(
            "EN-1",
            Owner {
                business_id: "BZ-9".into(),
                user_id: Some("US-3".into()),
            },
        );
        let resolver = resolver_with(accounts);
        let owner = resolver
            .resolve_owner("EN-1", EntityType::Consumer, Some("AC-1"))
            .await
            .unwrap();
        assert_eq!(owner.business_id, "BZ-9");
        assert_eq!(owner.user_id.as_deref(), Some("US-3"));
    }

    #[tokio::test]
    async fn test_missing_owner_is_fatal() {
        let resolver = resolver_with(FakeAccountDirectory::default());
        let err = resolver
            .resolve_owner("EN-404", EntityType::Consumer, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::OwnerNotFound { .. }));
    }

    #[tokio::test]
    async fn test_member_is_unsupported() {
        let resolver = resolver_with(FakeAccountDirectory::default());
        let err = resolver
            .resolve_owner("EN-1", EntityType::Member, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::UnsupportedEntityType(_)));
    }

    #[test]
    fn test_internal_transfer_detection() {
        let ctx = TransferContext {
            money_transfer_id: "MM-1".into(),
            ..Default::default()
        };
        assert!(ctx.is_internal());

        let ctx = TransferContext {
            money_transfer_id: "MM-2".into(),
            contact: Some(Contact {
                id: "CN-1".into(),
                name: "Wise User".into(),
            }),
            ..Default::default()
        };
        assert!(!ctx.is_internal());
    }
}
