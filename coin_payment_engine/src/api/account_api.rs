use cps_common::Coins;

use crate::{
    db_types::{Account, LedgerEntry},
    traits::{AccountApiError, AccountManagement},
};

/// Account reads and recharges.
#[derive(Debug, Clone)]
pub struct AccountApi<B> {
    db: B,
}

impl<B> AccountApi<B>
where B: AccountManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// The user's account, created with a zero balance on first sight.
    pub async fn account(&self, user_id: i64) -> Result<Account, AccountApiError> {
        self.db.fetch_or_create_account(user_id).await
    }

    pub async fn balance(&self, user_id: i64) -> Result<Coins, AccountApiError> {
        let account = self.db.fetch_account(user_id).await?;
        Ok(account.map(|a| a.balance).unwrap_or_default())
    }

    pub async fn recharge(&self, user_id: i64, amount: Coins) -> Result<Account, AccountApiError> {
        self.db.process_recharge(user_id, amount).await
    }

    pub async fn history(&self, user_id: i64) -> Result<Vec<LedgerEntry>, AccountApiError> {
        self.db.ledger_entries_for_user(user_id).await
    }
}
