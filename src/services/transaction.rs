//! Transaction Service
//!
//! Purchases, deposits and withdrawals built on the balance and product
//! services.

use tracing::{error, info};

use crate::error::{ShopError, ShopResult};
use crate::lock::LockRegistry;
use crate::services::balance::{BalanceChange, BalanceService};
use crate::services::models::{AccountBalance, Balance, PurchaseReceipt, TransactionKind};
use crate::services::product::{validate_quantity, ProductService};

// == Transaction Service ==
#[derive(Clone, Debug)]
pub struct TransactionService {
    locks: LockRegistry,
    balances: BalanceService,
    products: ProductService,
}

impl TransactionService {
    pub fn new(balances: BalanceService, products: ProductService) -> Self {
        Self::with_locks(balances, products, LockRegistry::new("transaction"))
    }

    pub fn with_locks(
        balances: BalanceService,
        products: ProductService,
        locks: LockRegistry,
    ) -> Self {
        Self {
            locks,
            balances,
            products,
        }
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    async fn registered_growid(&self, discord_id: &str) -> ShopResult<String> {
        self.balances
            .get_growid(discord_id)
            .await?
            .ok_or_else(|| ShopError::NotRegistered(discord_id.to_string()))
    }

    // == Purchase ==
    /// Sells `quantity` units of `product_code` to the Discord user `buyer_id`.
    ///
    /// The buyer and the product's stock are locked together for the whole
    /// purchase. The balance is debited before the stock is marked sold; if
    /// marking fails the debit is refunded.
    pub async fn process_purchase(
        &self,
        buyer_id: &str,
        product_code: &str,
        quantity: usize,
    ) -> ShopResult<PurchaseReceipt> {
        validate_quantity(quantity)?;

        let keys = [
            format!("purchase_{}", buyer_id),
            format!("stock_{}", product_code.to_lowercase()),
        ];
        let _guard = self
            .locks
            .acquire_many(keys, self.locks.lock_timeout())
            .await
            .ok_or_else(|| ShopError::Busy(format!("purchase_{}", buyer_id)))?;

        let growid = self.registered_growid(buyer_id).await?;
        let product = self
            .products
            .get_product(product_code)
            .await?
            .ok_or_else(|| ShopError::ProductNotFound(product_code.to_string()))?;

        let stock = self
            .products
            .load_available_stock(&product.code, quantity)
            .await?;
        if stock.len() < quantity {
            return Err(ShopError::InsufficientStock {
                requested: quantity,
                available: stock.len(),
            });
        }

        let items_count = i64::try_from(quantity).unwrap_or(i64::MAX);
        let total_price = product.price.checked_mul(items_count).ok_or_else(|| {
            ShopError::InvalidAmount(format!(
                "total price of {}x {} is out of range",
                quantity, product.code
            ))
        })?;
        let mut change = BalanceChange::new(
            -total_price,
            format!("Purchased {}x {} for {} WL", quantity, product.name, total_price),
            TransactionKind::Purchase,
        );
        change.items_count = items_count;
        change.total_price = total_price;
        let new_balance = self.balances.update_balance_with(&growid, change).await?;

        let ids = stock.iter().map(|item| item.id).collect();
        if let Err(err) = self.products.mark_sold(&product.code, ids, buyer_id).await {
            error!(
                "Failed to mark stock sold for {} buying {}: {}; refunding",
                growid, product.code, err
            );
            self.refund(&growid, total_price, &product.name).await;
            return Err(err);
        }

        info!(
            "Purchase successful: {} bought {}x {}",
            growid, quantity, product.code
        );

        Ok(PurchaseReceipt {
            growid,
            product_code: product.code,
            quantity,
            total_paid: total_price,
            contents: stock.into_iter().map(|item| item.content).collect(),
            new_balance,
        })
    }

    async fn refund(&self, growid: &str, amount: i64, product_name: &str) {
        let details = format!("Refund for failed purchase of {}", product_name);
        if let Err(err) = self
            .balances
            .update_balance(growid, amount, &details, TransactionKind::Refund)
            .await
        {
            error!("Refund of {} WL to {} failed: {}", amount, growid, err);
        }
    }

    // == Deposit / Withdrawal ==
    /// Credits `amount` to the Discord user's account.
    pub async fn process_deposit(
        &self,
        user_id: &str,
        amount: Balance,
    ) -> ShopResult<AccountBalance> {
        let lock_key = format!("deposit_{}", user_id);
        let _guard = self
            .locks
            .acquire(&lock_key)
            .await
            .ok_or_else(|| ShopError::Busy(lock_key.clone()))?;

        let growid = self.registered_growid(user_id).await?;
        let total = validate_amount(&amount, "Deposit")?;

        let details = format!("Deposit: {}", amount);
        let balance = self
            .balances
            .update_balance(&growid, total, &details, TransactionKind::Deposit)
            .await?;

        info!("Deposit successful: {} deposited {} WL", growid, total);
        Ok(AccountBalance { growid, balance })
    }

    /// Debits `amount` from the Discord user's account.
    pub async fn process_withdrawal(
        &self,
        user_id: &str,
        amount: Balance,
    ) -> ShopResult<AccountBalance> {
        let lock_key = format!("withdrawal_{}", user_id);
        let _guard = self
            .locks
            .acquire(&lock_key)
            .await
            .ok_or_else(|| ShopError::Busy(lock_key.clone()))?;

        let growid = self.registered_growid(user_id).await?;
        let total = validate_amount(&amount, "Withdrawal")?;

        let details = format!("Withdrawal: {}", amount);
        let balance = self
            .balances
            .update_balance(&growid, -total, &details, TransactionKind::Withdraw)
            .await?;

        info!("Withdrawal successful: {} withdrew {} WL", growid, total);
        Ok(AccountBalance { growid, balance })
    }
}

fn validate_amount(amount: &Balance, what: &str) -> ShopResult<i64> {
    if amount.has_negative() {
        return Err(ShopError::InvalidAmount(format!(
            "{} amounts cannot be negative",
            what
        )));
    }
    let total = amount
        .total_wl()
        .ok_or_else(|| ShopError::InvalidAmount(format!("{} amount is out of range", what)))?;
    if total <= 0 {
        return Err(ShopError::InvalidAmount(format!(
            "{} amount must be greater than 0",
            what
        )));
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::shop;
    use crate::services::StockStatus;

    async fn services() -> (TransactionService, BalanceService, ProductService) {
        let (db, cache) = shop().await;
        let balances = BalanceService::new(db.clone(), cache.clone());
        let products = ProductService::new(db, cache.clone());
        let transactions = TransactionService::new(balances.clone(), products.clone());
        (transactions, balances, products)
    }

    async fn stocked(products: &ProductService, units: usize) {
        products.create_product("DIRT", "Dirt Seeds", 250, None).await.unwrap();
        for i in 0..units {
            products
                .add_stock_item("DIRT", &format!("dirt-{}", i), "admin")
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_deposit_and_withdraw() {
        let (transactions, balances, _) = services().await;
        balances.register_user("1", "Alice").await.unwrap();

        let account = transactions
            .process_deposit("1", Balance::new(50, 1, 1))
            .await
            .unwrap();
        assert_eq!(account.growid, "Alice");
        assert_eq!(account.balance.total_wl(), Some(10_150));

        let account = transactions
            .process_withdrawal("1", Balance::new(0, 1, 0))
            .await
            .unwrap();
        assert_eq!(account.balance, Balance::new(50, 0, 1));
    }

    #[tokio::test]
    async fn test_deposit_requires_registration_and_positive_amount() {
        let (transactions, balances, _) = services().await;

        let err = transactions
            .process_deposit("1", Balance::new(10, 0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::NotRegistered(_)));

        balances.register_user("1", "Alice").await.unwrap();
        let err = transactions
            .process_deposit("1", Balance::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::InvalidAmount(_)));

        let err = transactions
            .process_deposit("1", Balance::new(-5, 1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn test_deposit_out_of_range_is_rejected() {
        let (transactions, balances, _) = services().await;
        balances.register_user("1", "Alice").await.unwrap();

        let err = transactions
            .process_deposit("1", Balance::new(0, 0, i64::MAX / 1000))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::InvalidAmount(_)));

        let err = transactions
            .process_withdrawal("1", Balance::new(i64::MAX, 1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::InvalidAmount(_)));
        assert_eq!(balances.get_balance("Alice").await.unwrap(), Some(Balance::default()));
    }

    #[tokio::test]
    async fn test_withdraw_more_than_balance() {
        let (transactions, balances, _) = services().await;
        balances.register_user("1", "Alice").await.unwrap();
        transactions
            .process_deposit("1", Balance::new(10, 0, 0))
            .await
            .unwrap();

        let err = transactions
            .process_withdrawal("1", Balance::new(0, 1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::InsufficientBalance { .. }));
    }

    #[tokio::test]
    async fn test_purchase_happy_path() {
        let (transactions, balances, products) = services().await;
        balances.register_user("1", "Alice").await.unwrap();
        transactions
            .process_deposit("1", Balance::new(0, 10, 0))
            .await
            .unwrap();
        stocked(&products, 3).await;

        let receipt = transactions.process_purchase("1", "dirt", 2).await.unwrap();

        assert_eq!(receipt.total_paid, 500);
        assert_eq!(receipt.contents, vec!["dirt-0", "dirt-1"]);
        assert_eq!(receipt.new_balance.total_wl(), Some(500));
        assert_eq!(products.get_stock_count("DIRT").await.unwrap(), 1);

        let history = balances.get_transaction_history("Alice", 10).await.unwrap();
        assert_eq!(history[0].kind, "PURCHASE");
        assert_eq!(history[0].items_count, 2);
    }

    #[tokio::test]
    async fn test_purchase_insufficient_balance_keeps_stock() {
        let (transactions, balances, products) = services().await;
        balances.register_user("1", "Alice").await.unwrap();
        stocked(&products, 1).await;

        let err = transactions.process_purchase("1", "DIRT", 1).await.unwrap_err();

        assert!(matches!(err, ShopError::InsufficientBalance { .. }));
        assert_eq!(products.get_stock_count("DIRT").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purchase_total_out_of_range() {
        let (transactions, balances, products) = services().await;
        balances.register_user("1", "Alice").await.unwrap();
        products
            .create_product("GEM", "Gem", i64::MAX / 2, None)
            .await
            .unwrap();
        for i in 0..3 {
            products
                .add_stock_item("GEM", &format!("gem-{}", i), "admin")
                .await
                .unwrap();
        }

        let err = transactions.process_purchase("1", "GEM", 3).await.unwrap_err();

        assert!(matches!(err, ShopError::InvalidAmount(_)));
        assert_eq!(products.get_stock_count("GEM").await.unwrap(), 3);
        assert!(balances.get_transaction_history("Alice", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purchase_insufficient_stock() {
        let (transactions, balances, products) = services().await;
        balances.register_user("1", "Alice").await.unwrap();
        transactions
            .process_deposit("1", Balance::new(0, 0, 1))
            .await
            .unwrap();
        stocked(&products, 1).await;

        let err = transactions.process_purchase("1", "DIRT", 2).await.unwrap_err();
        assert!(matches!(
            err,
            ShopError::InsufficientStock {
                requested: 2,
                available: 1
            }
        ));
        assert_eq!(balances.get_balance("Alice").await.unwrap().unwrap().total_wl(), Some(10_000));
    }

    #[tokio::test]
    async fn test_purchase_rejects_bad_quantity_and_unknown_product() {
        let (transactions, balances, _) = services().await;
        balances.register_user("1", "Alice").await.unwrap();

        assert!(matches!(
            transactions.process_purchase("1", "DIRT", 0).await,
            Err(ShopError::InvalidAmount(_))
        ));
        assert!(matches!(
            transactions.process_purchase("1", "NOPE", 1).await,
            Err(ShopError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_purchases_do_not_oversell() {
        let (transactions, balances, products) = services().await;
        stocked(&products, 3).await;
        for user in 0..6 {
            let id = user.to_string();
            balances.register_user(&id, &format!("user{}", user)).await.unwrap();
            transactions
                .process_deposit(&id, Balance::new(0, 10, 0))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for user in 0..6 {
            let transactions = transactions.clone();
            handles.push(tokio::spawn(async move {
                transactions
                    .process_purchase(&user.to_string(), "DIRT", 1)
                    .await
            }));
        }

        let mut sold = Vec::new();
        for handle in handles {
            if let Ok(receipt) = handle.await.unwrap() {
                sold.extend(receipt.contents);
            }
        }
        sold.sort();
        sold.dedup();

        assert_eq!(sold.len(), 3);
        assert_eq!(products.get_stock_count("DIRT").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purchase_skips_units_removed_by_admin() {
        let (transactions, balances, products) = services().await;
        balances.register_user("1", "Alice").await.unwrap();
        transactions
            .process_deposit("1", Balance::new(0, 10, 0))
            .await
            .unwrap();
        stocked(&products, 2).await;

        let first = products.get_available_stock("DIRT", 1).await.unwrap();
        products
            .update_stock_status(first[0].id, StockStatus::Deleted, None)
            .await
            .unwrap();

        let receipt = transactions.process_purchase("1", "DIRT", 1).await.unwrap();
        assert_eq!(receipt.contents, vec!["dirt-1"]);
    }
}
