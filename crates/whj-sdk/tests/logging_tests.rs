//! 日志作用域集成测试

mod common;

use common::*;
use std::time::Duration;
use whj_can::mock::MockAdapter;
use whj_driver::{DriverError, WhjBus};
use whj_tools::LOG_HEADER;

fn log_sink() -> (tempfile::NamedTempFile, Box<dyn std::io::Write + Send>) {
    let file = tempfile::NamedTempFile::new().unwrap();
    let sink = Box::new(file.reopen().unwrap());
    (file, sink)
}

#[test]
fn three_operations_yield_header_plus_three_rows() {
    let (adapter, handle) = MockAdapter::new();
    let bus = WhjBus::new(adapter, None).unwrap().with_policy(fast_policy());

    install_auto_responder(&handle, 1_234_567);
    bus.online(motor(1)).unwrap();

    let (file, sink) = log_sink();
    bus.start_log(sink).unwrap();

    bus.get(motor(1), "CUR_POSITION").unwrap();
    bus.set(motor(1), "SYS_ENABLE_DRIVER", 0.0).unwrap();
    bus.get(motor(1), "SYS_VOLTAGE").unwrap();

    let summary = bus.stop_log().unwrap();
    assert_eq!(summary.records_written, 3);

    let contents = std::fs::read_to_string(file.path()).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 4, "header + exactly three data rows");
    assert_eq!(lines[0], LOG_HEADER);

    // 完成序与内容
    let row1: Vec<&str> = lines[1].split(',').collect();
    assert_eq!(&row1[2..5], &["1", "get", "CUR_POSITION"]);
    assert_eq!(row1[5], "1234567");
    assert_eq!(row1[7], "ok");

    let row2: Vec<&str> = lines[2].split(',').collect();
    assert_eq!(&row2[2..5], &["1", "set", "SYS_ENABLE_DRIVER"]);
    assert_eq!(row2[5], "0");
    assert_eq!(row2[7], "ok");

    let row3: Vec<&str> = lines[3].split(',').collect();
    assert_eq!(row3[4], "SYS_VOLTAGE");
    assert_eq!(row3[7], "ok");

    // 时间戳单调递增（完成序）
    let t1: u64 = row1[0].parse().unwrap();
    let t3: u64 = row3[0].parse().unwrap();
    assert!(t3 >= t1);
}

#[test]
fn timeout_outcome_recorded_in_completion_order() {
    let (adapter, handle) = MockAdapter::new();
    let bus = WhjBus::new(adapter, None).unwrap().with_policy(fast_policy());

    install_auto_responder(&handle, 0);
    bus.online(motor(1)).unwrap();

    let (file, sink) = log_sink();
    bus.start_log(sink).unwrap();

    bus.get(motor(1), "CUR_POSITION").unwrap();
    handle.set_silent(true);
    assert!(matches!(
        bus.get(motor(1), "CUR_POSITION"),
        Err(DriverError::Timeout)
    ));
    bus.stop_log().unwrap();

    let contents = std::fs::read_to_string(file.path()).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].ends_with(",ok"));
    assert!(lines[2].ends_with(",timeout"));
}

#[test]
fn operations_before_start_and_after_stop_not_logged() {
    let (adapter, handle) = MockAdapter::new();
    let bus = WhjBus::new(adapter, None).unwrap().with_policy(fast_policy());

    install_auto_responder(&handle, 0);
    bus.online(motor(1)).unwrap();
    bus.get(motor(1), "CUR_POSITION").unwrap(); // 作用域外

    let (file, sink) = log_sink();
    bus.start_log(sink).unwrap();
    bus.get(motor(1), "CUR_POSITION").unwrap(); // 作用域内
    bus.stop_log().unwrap();
    bus.get(motor(1), "CUR_POSITION").unwrap(); // 作用域外

    let contents = std::fs::read_to_string(file.path()).unwrap();
    assert_eq!(contents.lines().count(), 2);
}

#[test]
fn scope_is_exclusive_and_restartable() {
    let (adapter, _handle) = MockAdapter::new();
    let bus = WhjBus::new(adapter, None).unwrap();

    assert!(matches!(bus.stop_log(), Err(DriverError::NotLogging)));

    let (_file1, sink1) = log_sink();
    bus.start_log(sink1).unwrap();
    assert!(bus.is_logging());

    let (_file2, sink2) = log_sink();
    assert!(matches!(
        bus.start_log(sink2),
        Err(DriverError::AlreadyLogging)
    ));

    bus.stop_log().unwrap();
    assert!(!bus.is_logging());

    // 每个日志会话一个新文件
    let (_file3, sink3) = log_sink();
    bus.start_log(sink3).unwrap();
    bus.stop_log().unwrap();
}

#[test]
fn stop_does_not_cancel_in_flight_request() {
    let (adapter, handle) = MockAdapter::new();
    let bus = WhjBus::new(adapter, None).unwrap().with_policy(fast_policy());

    install_auto_responder(&handle, 0);
    bus.online(motor(1)).unwrap();

    // 30ms 后才有应答的在途请求
    install_delayed_responder(&handle, Duration::from_millis(30), 9);

    let (file, sink) = log_sink();
    bus.start_log(sink).unwrap();

    std::thread::scope(|scope| {
        let in_flight = scope.spawn(|| bus.get(motor(1), "CUR_POSITION"));
        std::thread::sleep(Duration::from_millis(5));

        // 作用域在请求在途时关闭：请求不被取消
        bus.stop_log().unwrap();

        let reading = in_flight.join().unwrap().unwrap();
        assert_eq!(reading.raw, 9);
    });

    // 该请求在作用域关闭后完成，被整条排除；文件只有表头，无半行记录
    let contents = std::fs::read_to_string(file.path()).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines[0], LOG_HEADER);
    for line in &lines[1..] {
        assert_eq!(line.split(',').count(), 8, "no partial rows: {line}");
    }
}
