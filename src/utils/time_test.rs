use super::time::now_ms;

#[test]
fn now_ms_is_monotonic_enough() {
    let a = now_ms();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let b = now_ms();

    assert!(a > 1_600_000_000_000);
    assert!(b >= a);
}
