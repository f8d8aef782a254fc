//! WireMock-based Domoticz API mocking infrastructure
//!
//! Serves `/domoticz/json.htm` the way a Domoticz server would, so the real
//! HTTP client can be exercised without a server on the network.

#![allow(dead_code)]

use domoticz_sensor_node::ServiceLocation;
use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockBuilder, MockServer, ResponseTemplate,
};

pub const API_PATH: &str = "/domoticz/json.htm";

/// Mock Domoticz server for testing
pub struct MockDomoticzServer {
    pub server: MockServer,
}

impl MockDomoticzServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Location as discovery would report it for this server
    pub fn location(&self) -> ServiceLocation {
        let address = self.server.address();
        ServiceLocation {
            host: "nas.local".to_string(),
            port: address.port(),
            path: "/domoticz".to_string(),
            address: address.ip().to_string(),
        }
    }

    fn api(request_type: &str) -> MockBuilder {
        Mock::given(method("GET"))
            .and(path(API_PATH))
            .and(query_param("type", request_type))
    }

    fn command(param: &str) -> MockBuilder {
        Self::api("command").and(query_param("param", param))
    }

    /// `type=hardware` answering with `records`
    pub async fn mock_hardware_list(&self, records: Value, expected_calls: u64) {
        Self::api("hardware")
            .respond_with(ok_with(json!({ "result": records })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    /// `param=addhardware` for `name`, answering with `idx`
    pub async fn mock_hardware_create(&self, name: &str, idx: &str, expected_calls: u64) {
        Self::command("addhardware")
            .and(query_param("htype", "15"))
            .and(query_param("name", name))
            .respond_with(ok_with(json!({ "idx": idx })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    /// `type=devices&filter=all` answering with `records`
    pub async fn mock_device_list(&self, records: Value, expected_calls: u64) {
        Self::api("devices")
            .and(query_param("filter", "all"))
            .respond_with(ok_with(json!({ "result": records })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    /// `type=createvirtualsensor` on `hardware_idx`, answering with `idx`
    pub async fn mock_device_create(&self, hardware_idx: &str, idx: &str, expected_calls: u64) {
        Self::api("createvirtualsensor")
            .and(query_param("idx", hardware_idx))
            .and(query_param("sensorname", "Temperature"))
            .and(query_param("sensortype", "82"))
            .respond_with(ok_with(json!({ "idx": idx })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    /// `param=udevice` for `device_idx` with exactly `svalue`
    pub async fn mock_update(&self, device_idx: &str, svalue: &str, expected_calls: u64) {
        Self::command("udevice")
            .and(query_param("idx", device_idx))
            .and(query_param("nvalue", "0"))
            .and(query_param("svalue", svalue))
            .respond_with(ok_with(json!({ "status": "OK", "title": "Update Device" })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    /// Every request of `request_type` fails with `status`
    pub async fn mock_failure(&self, request_type: &str, status: u16) {
        Self::api(request_type)
            .respond_with(ResponseTemplate::new(status).set_body_string("Internal Server Error"))
            .mount(&self.server)
            .await;
    }
}

/// Domoticz wraps successful answers with `"status": "OK"`
pub fn ok_with(mut body: Value) -> ResponseTemplate {
    if let Some(object) = body.as_object_mut() {
        object.entry("status").or_insert_with(|| json!("OK"));
    }
    ResponseTemplate::new(200).set_body_json(body)
}
