use entitle_types::{BillingResult, ResponseCode, ResponsePolicy};

const ALL: [ResponseCode; 13] = [
    ResponseCode::ServiceTimeout,
    ResponseCode::FeatureNotSupported,
    ResponseCode::ServiceDisconnected,
    ResponseCode::Ok,
    ResponseCode::UserCancelled,
    ResponseCode::ServiceUnavailable,
    ResponseCode::BillingUnavailable,
    ResponseCode::ItemUnavailable,
    ResponseCode::DeveloperError,
    ResponseCode::Error,
    ResponseCode::ItemAlreadyOwned,
    ResponseCode::ItemNotOwned,
    ResponseCode::NetworkError,
];

#[test]
fn numeric_codes_map_back() {
    for code in ALL {
        assert_eq!(ResponseCode::from_code(code.code()), code);
    }
}

#[test]
fn unknown_numeric_code_is_error() {
    assert_eq!(ResponseCode::from_code(42), ResponseCode::Error);
    assert_eq!(ResponseCode::from_code(-99), ResponseCode::Error);
}

#[test]
fn policy_table() {
    assert_eq!(ResponseCode::Ok.policy(), ResponsePolicy::Proceed);
    assert_eq!(ResponseCode::UserCancelled.policy(), ResponsePolicy::Informational);
    assert_eq!(ResponseCode::ItemAlreadyOwned.policy(), ResponsePolicy::Informational);
    assert_eq!(ResponseCode::DeveloperError.policy(), ResponsePolicy::Fatal);
    assert_eq!(ResponseCode::ServiceDisconnected.policy(), ResponsePolicy::Reconnect);
    assert_eq!(ResponseCode::NetworkError.policy(), ResponsePolicy::Failed);
    assert_eq!(ResponseCode::ServiceTimeout.policy(), ResponsePolicy::Failed);
    assert_eq!(ResponseCode::ItemUnavailable.policy(), ResponsePolicy::Failed);
}

#[test]
fn only_ok_is_ok() {
    for code in ALL {
        assert_eq!(code.is_ok(), code == ResponseCode::Ok);
    }
}

#[test]
fn billing_result_display() {
    assert_eq!(BillingResult::ok().to_string(), "Ok(0)");
    let r = BillingResult::new(ResponseCode::DeveloperError, "sku not found");
    assert_eq!(r.to_string(), "DeveloperError(5) (sku not found)");
    assert!(!r.is_ok());
}

#[test]
fn billing_result_from_code() {
    let r: BillingResult = ResponseCode::UserCancelled.into();
    assert_eq!(r.code, ResponseCode::UserCancelled);
    assert!(r.debug_message.is_empty());
}
