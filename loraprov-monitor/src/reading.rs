use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// A sensor reading as printed by the firmware
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub voltage: Option<f64>,
    /// Device uptime in milliseconds
    #[serde(rename(deserialize = "timestamp"))]
    pub device_timestamp: Option<u64>,
}

/// The value shared between the reader loop and the server
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct LatestReading {
    #[serde(flatten)]
    pub reading: Reading,
    /// When the host received the reading
    pub timestamp: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Decode a line from the device.
///
/// Returns `None` for lines that are not JSON objects at all (boot banners,
/// log lines).
fn decode(line: &str) -> Option<Result<Reading, serde_json::Error>> {
    let line = line.trim();
    if !(line.starts_with('{') && line.ends_with('}')) {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Read lines until EOF or cancellation, publishing every decoded reading.
///
/// I/O errors are recorded in the shared value and end the loop.
#[instrument(name = "reader", skip_all)]
pub async fn read_loop<R>(input: R, latest: Sender<LatestReading>, cancel: CancellationToken)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = cancel.cancelled() => break,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("input closed");
                break;
            }
            Err(err) => {
                warn!("serial read failed: {err}");
                latest.send_modify(|value| value.error = Some(err.to_string()));
                break;
            }
        };

        match decode(&line) {
            Some(Ok(reading)) => {
                info!(
                    temperature = reading.temperature,
                    humidity = reading.humidity,
                    pressure = reading.pressure,
                    voltage = reading.voltage,
                    "reading"
                );
                latest.send_replace(LatestReading {
                    reading,
                    timestamp: Some(Utc::now()),
                    error: None,
                });
            }
            Some(Err(err)) => {
                warn!("failed to decode reading: {err}");
                latest.send_modify(|value| value.error = Some(format!("JSON parse error: {err}")));
            }
            None => debug!("{line}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::watch;

    #[test]
    fn test_decode_reading() {
        let line = r#"{"temperature":21.53,"humidity":40.10,"pressure":1013.25,"voltage":3.91,"timestamp":123456}"#;
        let reading = decode(line).unwrap().unwrap();
        assert_eq!(reading.temperature, Some(21.53));
        assert_eq!(reading.device_timestamp, Some(123456));
    }

    #[test]
    fn test_decode_skips_non_json_lines() {
        assert!(decode("ClimateGuard Serial Firmware").is_none());
        assert!(decode("").is_none());
        assert!(decode("{broken").is_none());
        assert!(decode("{broken}").unwrap().is_err());
    }

    #[tokio::test]
    async fn test_read_loop_keeps_latest_value() {
        let input: &[u8] = b"BME280 sensor initialized successfully\n\
            {\"temperature\":20.0,\"timestamp\":1}\n\
            {\"temperature\":22.5,\"humidity\":50.0,\"timestamp\":2}\n";
        let (tx, rx) = watch::channel(LatestReading::default());

        read_loop(input, tx, CancellationToken::new()).await;

        let latest = rx.borrow().clone();
        assert_eq!(latest.reading.temperature, Some(22.5));
        assert_eq!(latest.reading.humidity, Some(50.0));
        assert_eq!(latest.reading.device_timestamp, Some(2));
        assert!(latest.timestamp.is_some());
        assert!(latest.error.is_none());
    }

    #[tokio::test]
    async fn test_read_loop_records_decode_error() {
        let input: &[u8] = b"{\"temperature\":20.0}\n{\"temperature\":nan}\n";
        let (tx, rx) = watch::channel(LatestReading::default());

        read_loop(input, tx, CancellationToken::new()).await;

        let latest = rx.borrow().clone();
        assert_eq!(latest.reading.temperature, Some(20.0));
        assert!(latest.error.unwrap().starts_with("JSON parse error"));
    }

    #[test]
    fn test_latest_reading_json_shape() {
        let latest = LatestReading {
            reading: Reading {
                temperature: Some(21.0),
                device_timestamp: Some(5),
                ..Default::default()
            },
            timestamp: None,
            error: None,
        };
        let value = serde_json::to_value(&latest).unwrap();
        assert_eq!(value["temperature"], 21.0);
        assert_eq!(value["device_timestamp"], 5);
        assert!(value["humidity"].is_null());
        assert!(value["error"].is_null());
    }
}
