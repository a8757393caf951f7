//! Exit code helpers as the `cardbot` binary imports them

use cardbot_core::{
    exit_code_description, exit_code_for, print_exit_codes, CliResult, ExitCodes, RobotError,
};

#[test]
fn test_exit_code_table_from_crate_root() {
    print_exit_codes();

    assert_eq!(exit_code_for(&RobotError::Cancelled), ExitCodes::CANCELLED);
    assert_eq!(exit_code_description(ExitCodes::CANCELLED), "Operation cancelled");
    assert_eq!(
        exit_code_description(ExitCodes::DEVICE_NOT_FOUND),
        "Device not found"
    );
}

#[test]
fn test_device_not_found_exit_code() {
    let err = RobotError::DeviceNotFound("CH340".to_string());
    let result = CliResult::from(anyhow::Error::new(err));
    assert_eq!(result.code(), ExitCodes::DEVICE_NOT_FOUND);
    assert!(!result.is_success());
}
