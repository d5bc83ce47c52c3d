use relay::command::{Command, CommandState};
use relay::composite::{AtomicCompositeCommand, CompositeState};
use relay::error::{CommandError, ErrorKind};
use relay::receivers::account::{transfer, BankAccount, DepositCommand};
use relay::receivers::device::{
    ConnectCommand, Device, DeviceOp, PlcDevice, SetParameterCommand, StartProgramCommand,
    DEFAULT_CONNECT_TIMEOUT,
};
use relay::receivers::email::{EmailService, SendEmailCommand};
use relay::receivers::shared;
use relay::retrying::RetryingCommand;
use relay::RetryPolicy;
use serde_json::json;

#[test]
fn test_transfer_with_insufficient_funds_leaves_balances_unchanged() {
    let source = shared(BankAccount::new("A", 100));
    let destination = shared(BankAccount::new("B", 50));

    let mut tx = transfer(source.clone(), destination.clone(), 150);
    let err = tx.run().unwrap_err();

    assert_eq!(err.failed_step, Some(0));
    assert_eq!(err.cause.kind(), ErrorKind::Account);
    assert!(err.is_clean_rollback());
    assert_eq!(tx.phase(), CompositeState::RolledBack);

    assert_eq!(source.lock().unwrap().balance_cents, 100);
    assert_eq!(destination.lock().unwrap().balance_cents, 50);
}

#[test]
fn test_transfer_commits_and_undoes() {
    let source = shared(BankAccount::new("A", 100));
    let destination = shared(BankAccount::new("B", 50));

    let mut tx = transfer(source.clone(), destination.clone(), 60);
    tx.run().unwrap();
    assert_eq!(source.lock().unwrap().balance_cents, 40);
    assert_eq!(destination.lock().unwrap().balance_cents, 110);

    assert!(tx.undo().is_success());
    assert_eq!(source.lock().unwrap().balance_cents, 100);
    assert_eq!(destination.lock().unwrap().balance_cents, 50);
}

#[test]
fn test_plc_start_failure_rolls_back_connect_and_parameter() {
    let plc = shared(PlcDevice::new("PLC-1").fail_on(DeviceOp::StartProgram));

    let mut tx = AtomicCompositeCommand::new("Start line")
        .step(ConnectCommand::new(plc.clone(), DEFAULT_CONNECT_TIMEOUT))
        .step(SetParameterCommand::new(plc.clone(), "cycle_time_ms", 10))
        .step(StartProgramCommand::new(plc.clone(), "MainLoop"));

    let err = tx.run().unwrap_err();
    assert_eq!(err.failed_step, Some(2));
    assert!(matches!(err.cause, CommandError::Device(_)));
    assert!(err.is_clean_rollback());
    assert_eq!(tx.executed_prefix(), 0);

    let plc = plc.lock().unwrap();
    assert!(!plc.is_connected());
    assert!(plc.params().is_empty());
    assert!(plc.running_program().is_none());
}

#[test]
fn test_set_parameter_undo_round_trips_prior_value() {
    let plc = shared(PlcDevice::new("PLC-2"));
    assert!(ConnectCommand::new(plc.clone(), DEFAULT_CONNECT_TIMEOUT)
        .execute()
        .is_success());

    let mut first = SetParameterCommand::new(plc.clone(), "speed", 42);
    assert!(first.execute().is_success());
    assert_eq!(plc.lock().unwrap().param("speed"), Some(&json!(42)));

    let mut second = SetParameterCommand::new(plc.clone(), "speed", 7);
    assert!(second.execute().is_success());
    assert!(second.undo().is_success());
    assert_eq!(plc.lock().unwrap().param("speed"), Some(&json!(42)));

    assert!(first.undo().is_success());
    assert_eq!(plc.lock().unwrap().param("speed"), None);
    assert_eq!(first.state(), CommandState::RolledBack);
}

#[test]
fn test_rollback_continues_past_failing_undo() {
    let plc = shared(PlcDevice::new("PLC-3"));
    let account = shared(BankAccount::new("ops", 0));

    let mut tx = AtomicCompositeCommand::new("Mixed")
        .step(DepositCommand::new(account.clone(), 500))
        .step(ConnectCommand::new(plc.clone(), DEFAULT_CONNECT_TIMEOUT))
        .step(SetParameterCommand::new(plc.clone(), "mode", "auto"))
        .step(DepositCommand::new(account.clone(), -1));

    // Parameter removal fails, so the rollback must still undo the connect and the deposit.
    plc.lock().unwrap().set_failing(DeviceOp::RemoveParam, true);

    let err = tx.run().unwrap_err();
    assert_eq!(err.failed_step, Some(3));
    assert_eq!(err.rollback_errors.len(), 1);
    assert_eq!(err.rollback_errors[0].step, 2);

    assert!(!plc.lock().unwrap().is_connected());
    assert_eq!(account.lock().unwrap().balance_cents, 0);
}

#[test]
fn test_retrying_step_inside_composite() {
    let service = shared(EmailService::default());
    service.lock().unwrap().fail_next(2);
    let account = shared(BankAccount::new("billing", 0));

    let mut tx = AtomicCompositeCommand::new("Charge and notify")
        .step(DepositCommand::new(account.clone(), 999))
        .step(RetryingCommand::new(
            SendEmailCommand::new(service.clone(), "ops@example.com", "Receipt", "999c"),
            RetryPolicy::immediate(2),
        ));

    tx.run().unwrap();
    assert_eq!(service.lock().unwrap().outbox().len(), 1);
    assert_eq!(account.lock().unwrap().balance_cents, 999);
}

#[test]
fn test_nested_composite_rolls_back_as_one_step() {
    let source = shared(BankAccount::new("A", 100));
    let destination = shared(BankAccount::new("B", 0));
    let service = shared(EmailService::default());

    let mut outer = AtomicCompositeCommand::new("Transfer and notify")
        .step(transfer(source.clone(), destination.clone(), 40))
        .step(SendEmailCommand::new(service.clone(), "", "Transfer done", ""));

    let err = outer.run().unwrap_err();
    assert_eq!(err.failed_step, Some(1));
    assert_eq!(err.cause.kind(), ErrorKind::Validation);
    assert!(err.is_clean_rollback());

    assert_eq!(source.lock().unwrap().balance_cents, 100);
    assert_eq!(destination.lock().unwrap().balance_cents, 0);
}
