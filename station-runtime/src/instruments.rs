//! Minimal instrument resources, enough to ground the step catalogue
//! against real proxied actors. Wire-level framing per instrument is out of
//! scope (§1); every resource here talks to its hardware through the one
//! [`Transport`] seam.

use crate::actor::CancelToken;
use crate::expose_actor;
use std::time::Duration;

/// The single seam instrument drivers cross: send a frame, receive a frame
/// with a timeout. Concrete wire protocols (SCPI, Modbus, a vendor binary
/// format) are implementation-defined and out of scope here.
pub trait Transport: Send + 'static {
    fn send(&mut self, bytes: &[u8]) -> Result<(), String>;
    fn recv(&mut self, timeout: Duration) -> Result<Vec<u8>, String>;
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Measurement {
    pub millivolts: u32,
    pub milliamps: u32,
}

pub struct PowerSupply {
    transport: Box<dyn Transport>,
}

impl PowerSupply {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn energize(&mut self, millivolts: u32, _cancel: &CancelToken) -> Result<(), String> {
        self.transport
            .send(format!("SOUR:VOLT {millivolts}").as_bytes())
    }

    async fn de_energize(&mut self, _cancel: &CancelToken) -> Result<(), String> {
        self.transport.send(b"OUTP OFF")
    }

    async fn measure(&mut self, _cancel: &CancelToken) -> Result<Measurement, String> {
        let reply = self.transport.send(b"MEAS?").and_then(|_| {
            self.transport.recv(Duration::from_millis(500))
        })?;
        parse_measurement(&reply)
    }
}

fn parse_measurement(bytes: &[u8]) -> Result<Measurement, String> {
    let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
    let mut parts = text.trim().split(',');
    let millivolts: u32 = parts
        .next()
        .ok_or("missing voltage field")?
        .parse()
        .map_err(|_| "voltage field not numeric".to_string())?;
    let milliamps: u32 = parts
        .next()
        .ok_or("missing current field")?
        .parse()
        .map_err(|_| "current field not numeric".to_string())?;
    Ok(Measurement {
        millivolts,
        milliamps,
    })
}

expose_actor! {
    resource: PowerSupply,
    proxy: PowerSupplyProxy,
    methods: {
        fn energize(millivolts: u32) -> ();
        fn de_energize() -> ();
        fn measure() -> Measurement;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LightSample {
    pub x: f64,
    pub y: f64,
    pub fcd: f64,
    pub cct: f64,
    pub duv: f64,
}

pub struct LightMeter {
    transport: Box<dyn Transport>,
}

impl LightMeter {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn sample(&mut self, _cancel: &CancelToken) -> Result<LightSample, String> {
        self.transport.send(b"READ?")?;
        let reply = self.transport.recv(Duration::from_millis(500))?;
        let text = std::str::from_utf8(&reply).map_err(|e| e.to_string())?;
        let mut f = text.trim().split(',').map(|s| s.parse::<f64>());
        Ok(LightSample {
            x: f.next().ok_or("missing x")?.map_err(|_| "x not numeric")?,
            y: f.next().ok_or("missing y")?.map_err(|_| "y not numeric")?,
            fcd: f.next().ok_or("missing fcd")?.map_err(|_| "fcd not numeric")?,
            cct: f.next().ok_or("missing cct")?.map_err(|_| "cct not numeric")?,
            duv: f.next().ok_or("missing duv")?.map_err(|_| "duv not numeric")?,
        })
    }
}

expose_actor! {
    resource: LightMeter,
    proxy: LightMeterProxy,
    methods: {
        fn sample() -> LightSample;
    }
}

pub struct Programmer {
    transport: Box<dyn Transport>,
}

impl Programmer {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn erase(&mut self, _cancel: &CancelToken) -> Result<(), String> {
        self.transport.send(b"ERASE")
    }

    async fn program(&mut self, image: Vec<u8>, cancel: &CancelToken) -> Result<(), String> {
        for chunk in image.chunks(256) {
            cancel.check_cancel().map_err(|e| e.to_string())?;
            self.transport.send(chunk)?;
        }
        Ok(())
    }

    async fn confirm(&mut self, expected_version: String, _cancel: &CancelToken) -> Result<bool, String> {
        self.transport.send(b"VER?")?;
        let reply = self.transport.recv(Duration::from_millis(1000))?;
        let text = std::str::from_utf8(&reply).map_err(|e| e.to_string())?;
        Ok(text.trim() == expected_version)
    }
}

expose_actor! {
    resource: Programmer,
    proxy: ProgrammerProxy,
    methods: {
        fn erase() -> ();
        fn program(image: Vec<u8>) -> ();
        fn confirm(expected_version: String) -> bool;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct FakeTransport {
        replies: VecDeque<Vec<u8>>,
    }

    impl Transport for FakeTransport {
        fn send(&mut self, _bytes: &[u8]) -> Result<(), String> {
            Ok(())
        }
        fn recv(&mut self, _timeout: Duration) -> Result<Vec<u8>, String> {
            self.replies.pop_front().ok_or_else(|| "no reply queued".to_string())
        }
    }

    #[tokio::test]
    async fn measure_parses_comma_separated_reply() {
        let mut psu = PowerSupply::new(Box::new(FakeTransport {
            replies: VecDeque::from([b"12000,250".to_vec()]),
        }));
        let cancel = CancelToken::new();
        let m = psu.measure(&cancel).await.unwrap();
        assert_eq!(
            m,
            Measurement {
                millivolts: 12000,
                milliamps: 250
            }
        );
    }
}
