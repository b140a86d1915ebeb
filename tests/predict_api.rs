#![cfg(feature = "predict-api")]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;

use roadvision::alert::{Alerter, MemoryOutput, SpeechSettings};
use roadvision::dashboard::{Dashboard, DashboardSettings, Preview};
use roadvision::detect::backends::{PredictApiConfig, PredictApiSource, SimulatedSource};
use roadvision::detect::{shared, RiskLevel, Severity, Shape};
use roadvision::ingest::UploadedImage;

/// Serve exactly one request with a canned response; returns the raw request body.
fn serve_once(status: &'static str, body: &'static str) -> Result<(String, JoinHandle<Vec<u8>>)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let base_url = format!("http://{}", listener.local_addr()?);
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
        let mut request_line = String::new();
        reader.read_line(&mut request_line).expect("request line");
        assert!(request_line.starts_with("POST /predict "), "{}", request_line);

        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("header");
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().expect("content length");
                }
            }
        }
        let mut request_body = vec![0u8; content_length];
        reader.read_exact(&mut request_body).expect("body");

        let mut stream = stream;
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).expect("write response");
        request_body
    });
    Ok((base_url, handle))
}

fn dashboard(base_url: &str) -> Result<(Dashboard, MemoryOutput)> {
    let api = PredictApiSource::new(PredictApiConfig {
        base_url: base_url.to_string(),
        timeout: Duration::from_secs(5),
    })?;
    let output = MemoryOutput::new();
    let alerter = Alerter::new(Box::new(output.clone()), SpeechSettings::default());
    let dash = Dashboard::new(
        DashboardSettings::default(),
        shared(SimulatedSource::with_seed(1)),
        shared(api),
        alerter,
    );
    Ok((dash, output))
}

fn image() -> UploadedImage {
    UploadedImage::from_bytes("road.jpg", b"\xff\xd8\xff\xe0JPEG".to_vec()).expect("jpeg upload")
}

const TWO_PREDICTIONS: &str = r#"{
    "predictions": [
        {"class_id": 0, "name": "포트홀", "confidence": 0.91, "type": "pothole",
         "x": 120, "y": 80, "width": 64, "height": 40,
         "width_cm": 35.5, "length_cm": 52.0, "area_m2": 0.18, "risk_level": "B"},
        {"class_id": 3, "name": "", "confidence": 0.4, "type": "crack",
         "x": 0, "y": 0, "width": 0, "height": 0, "risk_level": "-"}
    ],
    "day_or_night": "day",
    "overall_risk": "B",
    "original_image_url": "http://cdn.local/original.jpg",
    "result_image_url": "http://cdn.local/result.jpg"
}"#;

#[test]
fn maps_prediction_response_onto_analysis() -> Result<()> {
    let (base_url, server) = serve_once("200 OK", TWO_PREDICTIONS)?;
    let (mut dash, output) = dashboard(&base_url)?;

    dash.upload(image())?;
    let request = server.join().expect("server thread");
    let request = String::from_utf8_lossy(&request);
    assert!(request.contains("name=\"file\"; filename=\"road.jpg\""));
    assert!(request.contains("Content-Type: image/jpeg"));

    assert!(!dash.is_analyzing());
    assert_eq!(dash.processing_status(), "분석 완료: 2개 항목 발견");
    assert_eq!(
        dash.preview(),
        &Preview::Remote {
            url: "http://cdn.local/result.jpg".to_string()
        }
    );

    let analysis = dash.analysis().expect("analysis");
    assert_eq!(analysis.day_or_night.as_deref(), Some("day"));
    assert_eq!(analysis.overall_risk, Some(RiskLevel::B));

    let pothole = &analysis.findings[0];
    assert_eq!(pothole.name, "포트홀");
    assert_eq!(pothole.severity, Severity::Medium);
    assert!(pothole.details.starts_with("신뢰도: 91%"));
    assert_eq!(pothole.shape, Some(Shape::bbox(120.0, 80.0, 64.0, 40.0)));

    let crack = &analysis.findings[1];
    assert_eq!(crack.name, "crack");
    assert_eq!(crack.severity, Severity::Low);
    assert_eq!(crack.shape, None);

    assert_eq!(dash.alert_count(), 2);
    assert_eq!(
        output.log().utterances,
        vec!["이미지 분석이 완료되어 2개 항목이 발견되었습니다.".to_string()]
    );
    assert_eq!(output.log().tones, 0);
    Ok(())
}

#[test]
fn missing_predictions_is_zero_findings() -> Result<()> {
    let (base_url, server) = serve_once("200 OK", r#"{"day_or_night": "night"}"#)?;
    let (mut dash, output) = dashboard(&base_url)?;

    dash.upload(image())?;
    server.join().expect("server thread");

    assert_eq!(dash.processing_status(), "분석 완료: 0개 항목 발견");
    assert!(dash.analysis().expect("analysis").findings.is_empty());
    assert!(matches!(dash.preview(), Preview::Image { .. }));
    assert_eq!(
        output.log().utterances,
        vec!["이미지 분석 결과, 특이사항이 발견되지 않았습니다.".to_string()]
    );
    Ok(())
}

#[test]
fn http_error_becomes_failure_status() -> Result<()> {
    let (base_url, server) = serve_once("500 Internal Server Error", r#"{"detail": "boom"}"#)?;
    let (mut dash, output) = dashboard(&base_url)?;

    dash.upload(image())?;
    server.join().expect("server thread");

    assert!(!dash.is_analyzing());
    assert!(dash.analysis().is_none());
    assert!(dash.processing_status().starts_with("분석 실패: "));
    assert!(dash.processing_status().contains("HTTP 500"));
    assert_eq!(
        output.log().utterances,
        vec!["이미지 분석에 실패했습니다.".to_string()]
    );
    Ok(())
}

#[test]
fn unreachable_endpoint_becomes_failure_status() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let base_url = format!("http://{}", listener.local_addr()?);
    drop(listener);

    let (mut dash, _) = dashboard(&base_url)?;
    dash.upload(image())?;

    assert!(!dash.is_analyzing());
    assert!(dash.analysis().is_none());
    assert!(dash.processing_status().starts_with("분석 실패: "));
    assert_eq!(dash.alert_count(), 0);
    Ok(())
}
