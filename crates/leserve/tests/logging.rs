// Subscriber installation runs in its own test binary because it sets
// process-global state.

use leserve::init_logging;

#[test]
fn second_install_is_reported() {
    assert!(init_logging("info").is_ok());

    let err = init_logging("debug").unwrap_err();
    assert!(err.to_string().contains("already been set"));
}
