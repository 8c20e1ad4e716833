use anyhow::Context;
use esp_idf_hal::{
    gpio::OutputPin,
    peripheral::Peripheral,
    rmt::{
        config::{CarrierConfig, DutyPercent, TransmitConfig},
        PinState, Pulse, PulseTicks, RmtChannel, TxRmtDriver, VariableLengthSignal,
    },
    units::FromValueType,
};
use log::{debug, warn};

use ac_remote_common::{GreeFrame, IrSink};

// 80 MHz APB clock / 80 = 1 µs per tick, so Gree timings map 1:1.
const IR_TICK_DIVIDER: u8 = 80;
const IR_DUTY_PERCENT: u8 = 33;

enum IrBackend {
    Rmt(TxRmtDriver<'static>),
    Disabled,
}

pub struct IrTransmitter {
    backend: IrBackend,
    sent_frames: u64,
    failed_frames: u64,
}

impl IrTransmitter {
    pub fn new<C, P>(
        channel: impl Peripheral<P = C> + 'static,
        pin: impl Peripheral<P = P> + 'static,
        carrier_khz: u32,
    ) -> anyhow::Result<Self>
    where
        C: RmtChannel,
        P: OutputPin,
    {
        let carrier = CarrierConfig::new()
            .frequency(carrier_khz.kHz().into())
            .carrier_level(PinState::High)
            .duty_percent(DutyPercent::new(IR_DUTY_PERCENT)?);

        let config = TransmitConfig::new()
            .clock_divider(IR_TICK_DIVIDER)
            .carrier(Some(carrier))
            .idle(Some(PinState::Low));

        let tx = TxRmtDriver::new(channel, pin, &config).context("failed to init RMT IR driver")?;

        Ok(Self {
            backend: IrBackend::Rmt(tx),
            sent_frames: 0,
            failed_frames: 0,
        })
    }

    pub fn disabled() -> Self {
        Self {
            backend: IrBackend::Disabled,
            sent_frames: 0,
            failed_frames: 0,
        }
    }

    pub fn sent_frames(&self) -> u64 {
        self.sent_frames
    }

    fn send_raw(&mut self, raw: &[u16]) -> anyhow::Result<()> {
        let tx = match &mut self.backend {
            IrBackend::Rmt(tx) => tx,
            IrBackend::Disabled => {
                warn!("IR disabled, dropping frame with {} timings", raw.len());
                return Ok(());
            }
        };

        // Even indices are marks (carrier on), odd indices are spaces.
        let mut pulses = Vec::with_capacity(raw.len());
        for (index, duration) in raw.iter().enumerate() {
            let level = if index % 2 == 0 {
                PinState::High
            } else {
                PinState::Low
            };

            pulses.push(Pulse::new(
                level,
                PulseTicks::new(*duration).context("invalid IR pulse duration")?,
            ));
        }

        let pulse_refs: Vec<&Pulse> = pulses.iter().collect();
        let mut signal = VariableLengthSignal::with_capacity(pulses.len());
        signal
            .push(pulse_refs)
            .context("failed to convert IR timings to RMT signal")?;

        tx.start_blocking(&signal)
            .context("failed to transmit IR frame over RMT")?;
        Ok(())
    }
}

impl IrSink for IrTransmitter {
    type Error = anyhow::Error;

    fn transmit(&mut self, frame: &GreeFrame) -> Result<(), Self::Error> {
        match self.send_raw(&frame.timings()) {
            Ok(()) => {
                self.sent_frames = self.sent_frames.saturating_add(1);
                debug!("sent gree frame {} (#{})", frame.to_hex(), self.sent_frames);
                Ok(())
            }
            Err(err) => {
                self.failed_frames = self.failed_frames.saturating_add(1);
                Err(err.context(format!(
                    "gree frame {} ({} failures so far)",
                    frame.to_hex(),
                    self.failed_frames
                )))
            }
        }
    }
}
