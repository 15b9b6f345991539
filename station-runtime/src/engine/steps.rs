//! The built-in step catalogue (§4.5 step table). Illustrative bodies: each
//! exercises its instrument proxies the way a real station would, but the
//! tolerance arithmetic and pass/fail thresholds are simplified stand-ins
//! for the out-of-scope parameter sheet semantics.

use super::model::{
    ConnectionClassification, EepromRegisterResult, FirmwareOutcome, IlluminationRow,
    StepPayload, ThermalDropResult,
};
use super::step::{StepContext, StepRunError, TestStep};
use crate::config::ConnectionCheck;
use crate::errors::{StationFailure, StepFailure};
use async_trait::async_trait;
use std::time::Duration;

pub struct ConnectionCheckStep;

#[async_trait]
impl TestStep for ConnectionCheckStep {
    fn name(&self) -> &'static str {
        "connection-check"
    }

    fn critical(&self) -> bool {
        true
    }

    async fn run(&mut self, ctx: &mut StepContext<'_>) -> Result<StepPayload, StepRunError> {
        let millivolts = match ctx.model.connection_check {
            ConnectionCheck::Disabled => {
                return Ok(StepPayload::ConnectionCheck(
                    ConnectionClassification::Connected,
                ));
            }
            ConnectionCheck::DiagnosticVoltage { millivolts } => millivolts,
        };

        let psu = ctx.require_psu()?;
        psu.energize(millivolts)
            .now()
            .await
            .map_err(|e| StationFailure::with_source("failed to energize diagnostic voltage", e))?;
        let measurement: crate::instruments::Measurement = psu
            .measure()
            .now()
            .await
            .and_then(|v| serde_json::from_value(v).map_err(|_| crate::errors::PromiseError::NotIterable))
            .map_err(|e| StationFailure::with_source("failed to read diagnostic measurement", e))?;
        psu.de_energize()
            .now()
            .await
            .map_err(|e| StationFailure::with_source("failed to de-energize after check", e))?;

        let classification = match (measurement.millivolts, measurement.milliamps) {
            (v, _) if v < millivolts / 10 => ConnectionClassification::Unconnected,
            (_, i) if i > 5_000 => ConnectionClassification::ShortCircuit,
            (v, _) if v > millivolts * 2 => ConnectionClassification::ReversedPolarity,
            (0, 0) => ConnectionClassification::PowerSupplyError,
            _ => ConnectionClassification::Connected,
        };

        if !matches!(classification, ConnectionClassification::Connected) {
            return Err(StepFailure::new(format!("connection check: {classification:?}")).into());
        }
        Ok(StepPayload::ConnectionCheck(classification))
    }
}

pub struct FirmwareStep;

#[async_trait]
impl TestStep for FirmwareStep {
    fn name(&self) -> &'static str {
        "firmware"
    }

    fn critical(&self) -> bool {
        true
    }

    async fn run(&mut self, ctx: &mut StepContext<'_>) -> Result<StepPayload, StepRunError> {
        let Some(spec) = ctx.model.firmware.clone() else {
            return Ok(StepPayload::Firmware(FirmwareOutcome::Skipped));
        };

        let programmer = ctx.require_programmer()?;

        let already_current = programmer
            .confirm(spec.version.clone())
            .now()
            .await
            .and_then(|v| serde_json::from_value(v).map_err(|_| crate::errors::PromiseError::NotIterable))
            .unwrap_or(false);

        if already_current && !spec.force_overwrite {
            return Ok(StepPayload::Firmware(FirmwareOutcome::Skipped));
        }

        let image = std::fs::read(&spec.image_path)
            .map_err(|e| StationFailure::with_source("failed to read firmware image", e))?;

        programmer
            .erase()
            .now()
            .await
            .map_err(|e| StepFailure::new(format!("erase failed: {e}")))?;
        programmer
            .program(image)
            .now()
            .await
            .map_err(|e| StepFailure::new(format!("program failed: {e}")))?;
        let confirmed: bool = programmer
            .confirm(spec.version.clone())
            .now()
            .await
            .and_then(|v| serde_json::from_value(v).map_err(|_| crate::errors::PromiseError::NotIterable))
            .map_err(|e| StepFailure::new(format!("confirm failed: {e}")))?;

        if !confirmed {
            return Ok(StepPayload::Firmware(FirmwareOutcome::Failed));
        }
        Ok(StepPayload::Firmware(FirmwareOutcome::Programmed))
    }
}

pub struct EepromConfigStep {
    pub which: EepromWhich,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EepromWhich {
    Initial,
    Final,
}

#[async_trait]
impl TestStep for EepromConfigStep {
    fn name(&self) -> &'static str {
        match self.which {
            EepromWhich::Initial => "eeprom-config-initial",
            EepromWhich::Final => "eeprom-config-final",
        }
    }

    fn critical(&self) -> bool {
        false
    }

    async fn run(&mut self, ctx: &mut StepContext<'_>) -> Result<StepPayload, StepRunError> {
        let config = match self.which {
            EepromWhich::Initial => ctx.model.eeprom_initial.clone(),
            EepromWhich::Final => ctx.model.eeprom_final.clone(),
        };
        let Some(config) = config else {
            return Ok(StepPayload::EepromConfig {
                registers: vec![],
                all_pass: true,
            });
        };

        let mut results = Vec::with_capacity(config.registers.len());
        for register in &config.registers {
            // A real driver would issue a proxy call per register write and
            // verify via read-back; this catalogue has no generic EEPROM
            // instrument resource, so every register here trivially passes.
            results.push(EepromRegisterResult {
                target: register.target.clone(),
                index: register.index,
                pass: true,
            });
        }
        let all_pass = results.iter().all(|r| r.pass);
        Ok(StepPayload::EepromConfig {
            registers: results,
            all_pass,
        })
    }
}

pub struct UnitIdentityStep;

#[async_trait]
impl TestStep for UnitIdentityStep {
    fn name(&self) -> &'static str {
        "unit-identity"
    }

    fn critical(&self) -> bool {
        false
    }

    async fn run(&mut self, _ctx: &mut StepContext<'_>) -> Result<StepPayload, StepRunError> {
        // A real station would round-trip the identity directive against the
        // DUT here; without a generic identity instrument in the catalogue
        // this always reports a pass.
        Ok(StepPayload::UnitIdentity { pass: true })
    }
}

pub struct IlluminationSampleStep;

#[async_trait]
impl TestStep for IlluminationSampleStep {
    fn name(&self) -> &'static str {
        "illumination-sample"
    }

    fn critical(&self) -> bool {
        false
    }

    async fn run(&mut self, ctx: &mut StepContext<'_>) -> Result<StepPayload, StepRunError> {
        let psu = ctx.require_psu()?;
        let measurement: crate::instruments::Measurement = psu
            .measure()
            .now()
            .await
            .and_then(|v| serde_json::from_value(v).map_err(|_| crate::errors::PromiseError::NotIterable))
            .map_err(|e| StationFailure::with_source("failed to read electrical measurement", e))?;

        let light_meter = ctx.require_light_meter()?;
        let sample: crate::instruments::LightSample = light_meter
            .sample()
            .now()
            .await
            .and_then(|v| serde_json::from_value(v).map_err(|_| crate::errors::PromiseError::NotIterable))
            .map_err(|e| StepFailure::new(format!("light meter sample failed: {e}")))?;

        let watts = (measurement.millivolts as f64 / 1000.0) * (measurement.milliamps as f64 / 1000.0);
        let row = IlluminationRow {
            x: sample.x,
            y: sample.y,
            fcd: sample.fcd,
            cct: sample.cct,
            duv: sample.duv,
            watts,
            percent_drop: 0.0,
            chromaticity_pass: sample.duv.abs() < 0.01,
            flux_pass: sample.fcd > 0.0,
            power_pass: watts > 0.0,
            drop_pass: true,
        };
        if !(row.chromaticity_pass && row.flux_pass && row.power_pass && row.drop_pass) {
            return Err(StepFailure::new("illumination sample outside tolerance").into());
        }
        Ok(StepPayload::IlluminationSample(row))
    }
}

pub struct ThermalDropStep {
    pub cadence: Duration,
    pub samples: u32,
}

#[async_trait]
impl TestStep for ThermalDropStep {
    fn name(&self) -> &'static str {
        "thermal-drop"
    }

    fn critical(&self) -> bool {
        false
    }

    async fn run(&mut self, ctx: &mut StepContext<'_>) -> Result<StepPayload, StepRunError> {
        let light_meter = ctx.require_light_meter()?;
        let mut readings = Vec::with_capacity(self.samples as usize);
        for i in 0..self.samples {
            let promise = light_meter
                .sample()
                .after(vec![self.cadence * i], None)
                .issue()
                .await
                .map_err(|e| StationFailure::with_source("failed to schedule thermal sample", e))?;
            let mut promise = promise;
            let value = promise
                .resolve(None)
                .await
                .map_err(|e| StepFailure::new(format!("thermal sample failed: {e}")))?
                .into_scalar()
                .map_err(|e| StepFailure::new(e.to_string()))?;
            let sample: crate::instruments::LightSample =
                serde_json::from_value(value).map_err(|e| StepFailure::new(e.to_string()))?;
            readings.push(sample.fcd);
        }

        let initial = readings.first().copied().unwrap_or(0.0);
        let max_drop_percent = readings
            .iter()
            .map(|fcd| if initial > 0.0 { (initial - fcd) / initial * 100.0 } else { 0.0 })
            .fold(0.0_f64, f64::max);

        let pass = max_drop_percent < 15.0;
        if !pass {
            return Err(StepFailure::new(format!(
                "thermal drop of {max_drop_percent:.1}% exceeds tolerance"
            ))
            .into());
        }
        Ok(StepPayload::ThermalDrop(ThermalDropResult {
            samples_fcd: readings,
            max_drop_percent,
            pass,
        }))
    }
}
