//! Missing transverse energy

use crate::{numeric::Float, record::EventRecord, Result};

/// Output of one missing-energy algorithm
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MetValues {
    pub pt: Float,
    pub phi: Float,
    pub sum_et: Float,
}

/// Missing energy as read from the record
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MetSnapshot {
    /// Particle-flow MET
    pub pf: MetValues,

    /// PUPPI MET, used for the transverse mass cut
    pub puppi: MetValues,

    /// Generator-level MET (pt, phi), simulation only
    pub gen: Option<(Float, Float)>,
}
//
impl MetSnapshot {
    /// Read the MET fields of an event
    pub fn from_record(record: &EventRecord, is_mc: bool) -> Result<Self> {
        let values = |prefix: &str| -> Result<MetValues> {
            Ok(MetValues {
                pt: record.scalar(&format!("{prefix}_pt"))?,
                phi: record.scalar(&format!("{prefix}_phi"))?,
                sum_et: record.scalar(&format!("{prefix}_sumEt"))?,
            })
        };
        let gen = if is_mc {
            Some((record.scalar("GenMET_pt")?, record.scalar("GenMET_phi")?))
        } else {
            None
        };
        Ok(Self {
            pf: values("MET")?,
            puppi: values("PuppiMET")?,
            gen,
        })
    }
}
