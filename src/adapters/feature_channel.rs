//! Feature channel: publishes `[RSI, POP, FLOW, ME_ring, ME]` once per
//! processed frame as a JSON line.  Purely observational.

use std::io::Write;

use log::warn;
use serde::Serialize;

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

#[derive(Serialize)]
struct FeatureMessage {
    seq: u64,
    /// `[RSI, POP, FLOW, ME_ring, ME]`
    data: [f32; 5],
}

pub struct FeatureChannelSink<W: Write> {
    out: W,
    seq: u64,
    failed: bool,
}

impl<W: Write> FeatureChannelSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            seq: 0,
            failed: false,
        }
    }

    pub fn published(&self) -> u64 {
        self.seq
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn publish(&mut self, data: [f32; 5]) -> std::io::Result<()> {
        let msg = FeatureMessage { seq: self.seq + 1, data };
        serde_json::to_writer(&mut self.out, &msg)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        self.seq += 1;
        Ok(())
    }
}

impl<W: Write> EventSink for FeatureChannelSink<W> {
    fn emit(&mut self, event: &AppEvent) {
        let AppEvent::Features(fv) = event else {
            return;
        };
        if let Err(e) = self.publish(fv.channel()) {
            if !self.failed {
                warn!("feature channel write failed: {e}");
            }
            self.failed = true;
        }
    }
}
