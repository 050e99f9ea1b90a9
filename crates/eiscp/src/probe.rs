//! Capability probe: a fixed sweep of status queries.
//!
//! The probe asks the receiver for every status value the integration
//! cares about, one query at a time, and records the raw reply (or its
//! absence) under the command code. Receivers ignore queries for features
//! they lack, so silence is expected and tolerated. Hard transport errors
//! abort the sweep.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use eiscp_core::error::Result;
use eiscp_core::types::{Capabilities, Zone};

use crate::client::EiscpClient;
use crate::commands::{
    AUDIO_MUTING, INPUT_SELECTOR, LISTENING_MODE, MASTER_VOLUME, POWER, ZONE2_MUTING, ZONE2_POWER,
    ZONE2_VOLUME, parse_input,
};
use crate::models::{DEFAULT_VOLUME_RESOLUTION, standard_inputs};
use crate::protocol::parse_response;

/// Status queries sent by [`probe`], in order.
pub const PROBE_COMMANDS: [&str; 8] = [
    POWER,
    MASTER_VOLUME,
    AUDIO_MUTING,
    INPUT_SELECTOR,
    LISTENING_MODE,
    ZONE2_POWER,
    ZONE2_VOLUME,
    ZONE2_MUTING,
];

/// Raw results of a probe sweep.
///
/// Serializes as `{"host": ..., "zone": ..., "raw": {"PWR": "...", "ZPW": null, ...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    /// `host:port` of the probed receiver.
    pub host: String,
    /// Zone the queries were addressed to.
    pub zone: String,
    /// Reply text per command code; `None` when the receiver stayed silent.
    pub raw: BTreeMap<String, Option<String>>,
}

impl ProbeReport {
    /// Raw reply for `code`, if it was answered.
    pub fn get(&self, code: &str) -> Option<&str> {
        self.raw.get(code).and_then(|r| r.as_deref())
    }

    /// Whether `code` got a reply.
    pub fn is_answered(&self, code: &str) -> bool {
        self.get(code).is_some()
    }

    /// Command codes that got a reply, in probe order.
    pub fn answered(&self) -> Vec<&'static str> {
        PROBE_COMMANDS
            .iter()
            .copied()
            .filter(|code| self.is_answered(code))
            .collect()
    }

    /// Build a capability snapshot with an explicit volume resolution.
    pub fn capabilities(&self, volume_resolution: u16) -> Capabilities {
        let mut zones = BTreeSet::new();
        zones.insert(Zone::MAIN);
        let zone2 = self
            .get(ZONE2_POWER)
            .and_then(parse_response)
            .is_some_and(|r| r.code == ZONE2_POWER);
        if zone2 {
            zones.insert(Zone::ZONE2);
        }

        let current_input = self
            .get(INPUT_SELECTOR)
            .and_then(parse_response)
            .filter(|r| r.code == INPUT_SELECTOR)
            .and_then(|r| parse_input(&r.argument).ok());

        Capabilities {
            volume_resolution,
            zones,
            inputs: standard_inputs(),
            current_input,
        }
    }
}

/// Derive [`Capabilities`] from a probe.
pub trait FromProbe {
    /// Zone 1 always, zone 2 when a `ZPW` reply was recorded, the default
    /// resolution, the standard input table, and the input reported by
    /// `SLI`.
    fn from_probe(report: &ProbeReport) -> Self;
}

impl FromProbe for Capabilities {
    fn from_probe(report: &ProbeReport) -> Self {
        report.capabilities(DEFAULT_VOLUME_RESOLUTION)
    }
}

/// Run the probe sweep with the client's command timeout.
pub async fn probe(client: &EiscpClient, zone: Zone) -> Result<ProbeReport> {
    probe_with_timeout(client, zone, client.command_timeout()).await
}

/// Run the probe sweep, waiting up to `timeout` for each reply.
pub async fn probe_with_timeout(
    client: &EiscpClient,
    zone: Zone,
    timeout: Duration,
) -> Result<ProbeReport> {
    let mut raw = BTreeMap::new();
    for code in PROBE_COMMANDS {
        let response = client.query_with_timeout(code, zone, timeout).await?;
        debug!(addr = %client.addr(), code, answered = response.is_some(), "probe query");
        raw.insert(code.to_string(), response);
    }

    let report = ProbeReport {
        host: client.addr().to_string(),
        zone: zone.to_string(),
        raw,
    };
    info!(
        addr = %client.addr(),
        answered = report.answered().len(),
        total = PROBE_COMMANDS.len(),
        "probe complete"
    );
    Ok(report)
}

impl EiscpClient {
    /// Probe the receiver and cache the resulting capabilities.
    pub async fn refresh_capabilities(&self) -> Result<Capabilities> {
        let report = probe(self, self.zone()).await?;
        let capabilities = report.capabilities(self.volume_resolution());
        *self.capabilities.lock().await = Some(capabilities.clone());
        Ok(capabilities)
    }

    /// The snapshot cached by the last
    /// [`refresh_capabilities`](Self::refresh_capabilities), if any.
    pub async fn capabilities(&self) -> Option<Capabilities> {
        self.capabilities.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode;
    use eiscp_core::Error;
    use eiscp_test_harness::{MockConnector, MockTransport};

    fn frame(payload: &str) -> Vec<u8> {
        encode(payload.as_bytes())
    }

    fn query_frame(code: &str) -> Vec<u8> {
        frame(&format!("!1{code}QSTN\r"))
    }

    fn client(mock: MockTransport) -> EiscpClient {
        EiscpClient::new(
            Box::new(MockConnector::single(mock)),
            Zone::MAIN,
            Duration::from_millis(100),
            Duration::from_millis(50),
            60,
        )
    }

    /// A mock that answers only the codes in `answers`.
    fn partial_receiver(answers: &[(&str, &str)]) -> MockTransport {
        let mut mock = MockTransport::new();
        for code in PROBE_COMMANDS {
            match answers.iter().find(|(c, _)| *c == code) {
                Some((_, reply)) => mock.expect(&query_frame(code), &frame(reply)),
                None => mock.expect_silent(&query_frame(code)),
            }
        }
        mock
    }

    #[tokio::test]
    async fn probe_records_only_answered_codes() {
        let mock = partial_receiver(&[("PWR", "!1PWR01\x1a"), ("MVL", "!1MVL28\x1a")]);
        let client = client(mock);

        let report = probe(&client, Zone::MAIN).await.unwrap();
        assert_eq!(report.raw.len(), PROBE_COMMANDS.len());
        assert_eq!(report.answered(), vec!["PWR", "MVL"]);
        assert_eq!(report.get("PWR"), Some("!1PWR01\u{1a}"));
        assert_eq!(report.get("ZPW"), None);
        assert_eq!(report.zone, "1");
        assert_eq!(report.host, "mock");
    }

    #[tokio::test]
    async fn late_reply_stays_under_its_own_code() {
        // PWR is answered only after its query gave up; the reply lands in
        // front of the MVL reply. LMD's reply arrives late after ZPW.
        let mut pwr_then_mvl = frame("!1PWR01\x1a");
        pwr_then_mvl.extend(frame("!1MVL28\x1a"));

        let mut mock = MockTransport::new();
        mock.expect_silent(&query_frame("PWR"));
        mock.expect(&query_frame("MVL"), &pwr_then_mvl);
        mock.expect(&query_frame("AMT"), &frame("!1AMT00\x1a"));
        mock.expect(&query_frame("SLI"), &frame("!1SLI2B\x1a"));
        mock.expect_silent(&query_frame("LMD"));
        mock.expect(&query_frame("ZPW"), &frame("!1LMD00\x1a"));
        mock.expect_silent(&query_frame("ZVL"));
        mock.expect_silent(&query_frame("ZMT"));
        let client = client(mock);

        let report = probe(&client, Zone::MAIN).await.unwrap();
        assert_eq!(report.get("PWR"), None);
        assert_eq!(report.get("MVL"), Some("!1MVL28\u{1a}"));
        assert_eq!(report.get("AMT"), Some("!1AMT00\u{1a}"));
        assert_eq!(report.get("SLI"), Some("!1SLI2B\u{1a}"));
        assert_eq!(report.get("LMD"), None);
        assert_eq!(report.get("ZPW"), None);
        assert_eq!(report.answered(), vec!["MVL", "AMT", "SLI"]);
        assert!(!Capabilities::from_probe(&report).has_zone(Zone::ZONE2));
    }

    #[tokio::test]
    async fn probe_propagates_hard_errors() {
        let mut mock = MockTransport::new();
        mock.expect(&query_frame("PWR"), &frame("!1PWR01\x1a"));
        mock.expect_write_failure(&query_frame("MVL"));
        let client = client(mock);

        let result = probe(&client, Zone::MAIN).await;
        assert!(matches!(result, Err(Error::Write(_))));
    }

    #[tokio::test]
    async fn probe_report_serializes_to_json() {
        let client = client(partial_receiver(&[("PWR", "!1PWR00\x1a")]));
        let report = probe(&client, Zone::MAIN).await.unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["host"], "mock");
        assert_eq!(json["zone"], "1");
        assert_eq!(json["raw"]["PWR"], "!1PWR00\u{1a}");
        assert!(json["raw"]["ZPW"].is_null());
    }

    #[test]
    fn capabilities_from_probe() {
        let mut raw: BTreeMap<String, Option<String>> =
            PROBE_COMMANDS.iter().map(|c| (c.to_string(), None)).collect();
        raw.insert("SLI".into(), Some("!1SLI23\u{1a}\r\n".into()));
        raw.insert("ZPW".into(), Some("!1ZPW00\u{1a}".into()));
        let report = ProbeReport {
            host: "10.0.0.5:60128".into(),
            zone: "1".into(),
            raw,
        };

        let caps = Capabilities::from_probe(&report);
        assert_eq!(caps.volume_resolution, DEFAULT_VOLUME_RESOLUTION);
        assert!(caps.has_zone(Zone::MAIN));
        assert!(caps.has_zone(Zone::ZONE2));
        assert_eq!(caps.current_input.as_deref(), Some("23"));
        assert_eq!(caps.input_code("cd"), Some("23"));
    }

    #[test]
    fn capabilities_ignore_zpw_entry_for_other_code() {
        let mut raw = BTreeMap::new();
        raw.insert("ZPW".to_string(), Some("!1LMD2A\u{1a}".to_string()));
        let report = ProbeReport {
            host: "mock".into(),
            zone: "1".into(),
            raw,
        };
        assert!(!report.capabilities(80).has_zone(Zone::ZONE2));
    }

    #[test]
    fn capabilities_main_zone_only_without_zpw() {
        let report = ProbeReport {
            host: "mock".into(),
            zone: "1".into(),
            raw: BTreeMap::new(),
        };
        let caps = report.capabilities(100);
        assert_eq!(caps.volume_resolution, 100);
        assert_eq!(caps.zones.len(), 1);
        assert_eq!(caps.current_input, None);
    }

    #[tokio::test]
    async fn refresh_capabilities_caches_snapshot() {
        let client = client(partial_receiver(&[
            ("PWR", "!1PWR01\x1a"),
            ("SLI", "!1SLI2B\x1a"),
        ]));
        assert_eq!(client.capabilities().await, None);

        let caps = client.refresh_capabilities().await.unwrap();
        assert_eq!(caps.volume_resolution, 60);
        assert_eq!(caps.current_input.as_deref(), Some("2B"));
        assert!(!caps.has_zone(Zone::ZONE2));
        assert_eq!(client.capabilities().await, Some(caps));
    }
}
