/*!
 * Bank account receiver with deposit/withdraw commands and atomic transfers
 *
 * Monetary values are integer cents.
 */

use thiserror::Error;

use super::{label, lock, Shared};
use crate::command::{Command, CommandCore, CommandId, CommandResult, CommandState};
use crate::composite::AtomicCompositeCommand;

/// Invalid account operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("Amount must be non-negative, got {0}")]
    NegativeAmount(i64),

    #[error("Insufficient funds in {account}: balance {balance_cents}, requested {requested_cents}")]
    InsufficientFunds {
        account: String,
        balance_cents: i64,
        requested_cents: i64,
    },

    #[error("Balance of {account} would overflow applying {amount_cents}")]
    Overflow { account: String, amount_cents: i64 },
}

/// Simple bank account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankAccount {
    pub name: String,
    pub balance_cents: i64,
    /// Allowed negative balance, e.g. 5_000 permits going down to -50.00
    pub overdraft_limit_cents: i64,
}

impl BankAccount {
    pub fn new(name: impl Into<String>, balance_cents: i64) -> Self {
        Self {
            name: name.into(),
            balance_cents,
            overdraft_limit_cents: 0,
        }
    }

    pub fn with_overdraft(mut self, limit_cents: i64) -> Self {
        self.overdraft_limit_cents = limit_cents;
        self
    }

    /// Add money, returning the previous balance
    pub fn deposit(&mut self, amount_cents: i64) -> Result<i64, AccountError> {
        if amount_cents < 0 {
            return Err(AccountError::NegativeAmount(amount_cents));
        }
        let next = self
            .balance_cents
            .checked_add(amount_cents)
            .ok_or_else(|| self.overflow(amount_cents))?;
        let previous = self.balance_cents;
        self.balance_cents = next;
        Ok(previous)
    }

    /// Remove money within the overdraft limit, returning the previous balance
    pub fn withdraw(&mut self, amount_cents: i64) -> Result<i64, AccountError> {
        if amount_cents < 0 {
            return Err(AccountError::NegativeAmount(amount_cents));
        }
        let next = self
            .balance_cents
            .checked_sub(amount_cents)
            .ok_or_else(|| self.overflow(amount_cents))?;
        let floor = self
            .overdraft_limit_cents
            .checked_neg()
            .ok_or_else(|| self.overflow(amount_cents))?;
        if next < floor {
            return Err(AccountError::InsufficientFunds {
                account: self.name.clone(),
                balance_cents: self.balance_cents,
                requested_cents: amount_cents,
            });
        }
        let previous = self.balance_cents;
        self.balance_cents = next;
        Ok(previous)
    }

    fn overflow(&self, amount_cents: i64) -> AccountError {
        AccountError::Overflow {
            account: self.name.clone(),
            amount_cents,
        }
    }
}

/// Deposits into an account; undo restores the balance held before the deposit
pub struct DepositCommand {
    core: CommandCore,
    account: Shared<BankAccount>,
    amount_cents: i64,
    previous_balance: i64,
}

impl DepositCommand {
    pub fn new(account: Shared<BankAccount>, amount_cents: i64) -> Self {
        let core = CommandCore::new(format!(
            "Deposit {}c to {}",
            amount_cents,
            label(&account, |a| a.name.clone())
        ));
        Self {
            core,
            account,
            amount_cents,
            previous_balance: 0,
        }
    }
}

impl Command for DepositCommand {
    fn id(&self) -> CommandId {
        self.core.id()
    }

    fn description(&self) -> &str {
        self.core.description()
    }

    fn state(&self) -> CommandState {
        self.core.state()
    }

    fn execute(&mut self) -> CommandResult {
        self.core.execute_with(|| {
            let mut account = lock(&self.account);
            self.previous_balance = account.deposit(self.amount_cents)?;
            Ok(format!(
                "Deposited {}c to {}, balance {}c",
                self.amount_cents, account.name, account.balance_cents
            ))
        })
    }

    fn undo(&mut self) -> CommandResult {
        self.core.undo_with(|| {
            let mut account = lock(&self.account);
            account.balance_cents = self.previous_balance;
            Ok(format!(
                "Reverted deposit on {}, balance {}c",
                account.name, account.balance_cents
            ))
        })
    }
}

/// Withdraws from an account; undo restores the balance held before the withdrawal
pub struct WithdrawCommand {
    core: CommandCore,
    account: Shared<BankAccount>,
    amount_cents: i64,
    previous_balance: i64,
}

impl WithdrawCommand {
    pub fn new(account: Shared<BankAccount>, amount_cents: i64) -> Self {
        let core = CommandCore::new(format!(
            "Withdraw {}c from {}",
            amount_cents,
            label(&account, |a| a.name.clone())
        ));
        Self {
            core,
            account,
            amount_cents,
            previous_balance: 0,
        }
    }
}

impl Command for WithdrawCommand {
    fn id(&self) -> CommandId {
        self.core.id()
    }

    fn description(&self) -> &str {
        self.core.description()
    }

    fn state(&self) -> CommandState {
        self.core.state()
    }

    fn execute(&mut self) -> CommandResult {
        self.core.execute_with(|| {
            let mut account = lock(&self.account);
            self.previous_balance = account.withdraw(self.amount_cents)?;
            Ok(format!(
                "Withdrew {}c from {}, balance {}c",
                self.amount_cents, account.name, account.balance_cents
            ))
        })
    }

    fn undo(&mut self) -> CommandResult {
        self.core.undo_with(|| {
            let mut account = lock(&self.account);
            account.balance_cents = self.previous_balance;
            Ok(format!(
                "Reverted withdrawal on {}, balance {}c",
                account.name, account.balance_cents
            ))
        })
    }
}

/// Build an atomic transfer: withdraw from `source`, then deposit into `destination`
pub fn transfer(
    source: Shared<BankAccount>,
    destination: Shared<BankAccount>,
    amount_cents: i64,
) -> AtomicCompositeCommand {
    let source_name = label(&source, |a| a.name.clone());
    let destination_name = label(&destination, |a| a.name.clone());
    let name = format!("Transfer {}c {} -> {}", amount_cents, source_name, destination_name);

    AtomicCompositeCommand::new(name)
        .step(WithdrawCommand::new(source, amount_cents))
        .step(DepositCommand::new(destination, amount_cents))
}
