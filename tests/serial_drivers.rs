mod common;

use common::ScriptedHal;
use serde_json::json;
use station_agent::domain::Reading;
use station_agent::drivers::frame::encode;
use station_agent::drivers::{
    DfrobotUltDriver, Driver, DriverError, Hx711LoadCellDriver, SerialRegexDriver,
};
use std::time::Duration;

#[tokio::test]
async fn test_dfrobot_skips_corrupted_frame() {
    let valid = encode(1234);
    let mut corrupted = valid;
    corrupted[3] ^= 0x5A;
    let hal = ScriptedHal::with_chunks(vec![
        vec![0x13, 0x37],
        corrupted.to_vec(),
        valid[..2].to_vec(),
        valid[2..].to_vec(),
        encode(999).to_vec(),
    ]);

    let driver = DfrobotUltDriver::new(hal.clone());
    let reading = driver
        .read(&json!({"port": "/dev/ttyAMA0", "baudrate": 115200}))
        .await
        .unwrap();

    assert_eq!(reading, Reading::single("distance_cm", 123.4));
    assert_eq!(hal.opened.lock().unwrap().as_slice(), [("/dev/ttyAMA0".to_string(), 115200)]);
}

#[tokio::test]
async fn test_dfrobot_times_out_on_silence() {
    let hal = ScriptedHal::with_chunks(vec![]);
    let driver = DfrobotUltDriver::new(hal);
    let started = std::time::Instant::now();
    let err = driver.read(&json!({"port": "/dev/ttyAMA0"})).await.unwrap_err();

    assert!(matches!(err, DriverError::Timeout(_)), "{}", err);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_dfrobot_requires_a_port() {
    let driver = DfrobotUltDriver::new(ScriptedHal::with_chunks(vec![]));
    let err = driver.read(&json!({"baudrate": 9600})).await.unwrap_err();
    assert!(matches!(err, DriverError::Config(_)));
}

#[tokio::test]
async fn test_hx711_dash_line_is_zero_weight() {
    let hal = ScriptedHal::with_chunks(vec![
        b"HX711 scale demo\r\n".to_vec(),
        b"Readings:\r\n= -".to_vec(),
        b"--\r\n= 4.50\r\n".to_vec(),
    ]);
    let driver = Hx711LoadCellDriver::new(hal);
    let reading = driver
        .read(&json!({"port": "/dev/ttyUSB0", "baudrate": "57600", "settle_secs": 0.01}))
        .await
        .unwrap();
    assert_eq!(reading, Reading::single("weight_kg", 0.0));
}

#[tokio::test]
async fn test_hx711_weight_split_across_reads() {
    let hal = ScriptedHal::with_chunks(vec![b"= 1".to_vec(), b"5.23\n".to_vec()]);
    let driver = Hx711LoadCellDriver::new(hal);
    let reading = driver
        .read(&json!({"port": "/dev/ttyUSB0", "settle_secs": 0.01}))
        .await
        .unwrap();
    assert_eq!(reading.number("weight_kg"), Some(15.23));
}

#[tokio::test]
async fn test_temp_humidity_ignores_noise_and_sends_trigger() {
    let hal = ScriptedHal::with_chunks(vec![
        b"boot ok\n".to_vec(),
        b"21.4 , 55.0\n".to_vec(),
        b"30.0,10.0\n".to_vec(),
    ]);
    let driver = SerialRegexDriver::temp_humidity(hal.clone());
    let reading = driver
        .read(&json!({"port": "/dev/ttyS0", "trigger": "R"}))
        .await
        .unwrap();

    assert_eq!(reading.number("temperature"), Some(21.4));
    assert_eq!(reading.number("humidity"), Some(55.0));
    assert_eq!(hal.written.lock().unwrap().as_slice(), b"R\n");
}

#[tokio::test]
async fn test_serial_regex_times_out_without_a_match() {
    let hal = ScriptedHal::with_chunks(vec![b"no numbers here\n".to_vec()]);
    let driver = SerialRegexDriver::new(hal);
    let err = driver
        .read(&json!({"port": "/dev/ttyS0", "timeout_secs": 0.2}))
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::Timeout(_)));
}
