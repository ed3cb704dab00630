//! Reconstructed electrons

use crate::{
    momentum::{from_pt_eta_phi_m, Kinematics, Momentum},
    numeric::Float,
    record::EventRecord,
    Result,
};

/// Cut-based identification level
///
/// Levels are ordered, so that `level >= CutBasedId::Loose` means "passes at
/// least the loose working point".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CutBasedId {
    Fail = 0,
    Veto = 1,
    Loose = 2,
    Medium = 3,
    Tight = 4,
}
//
impl CutBasedId {
    /// Decode the record's integer encoding
    fn from_level(level: i32) -> Self {
        match level {
            l if l >= 4 => CutBasedId::Tight,
            3 => CutBasedId::Medium,
            2 => CutBasedId::Loose,
            1 => CutBasedId::Veto,
            _ => CutBasedId::Fail,
        }
    }
}

/// A reconstructed electron
#[derive(Clone, Debug)]
pub struct Electron {
    /// Four-momentum
    p4: Momentum,

    /// Position in the record arrays
    pub index: usize,

    /// Electric charge, ±1
    pub charge: i32,

    /// Cut-based identification level
    pub cut_based: CutBasedId,

    /// Super-cluster eta minus track eta
    pub delta_eta_sc: Float,

    /// Passed the loose selection, `None` until selection has run
    loose: Option<bool>,
}
//
impl Electron {
    /// Build an electron from its kinematics
    pub fn new(p4: Momentum, index: usize, charge: i32, cut_based: CutBasedId) -> Self {
        Self {
            p4,
            index,
            charge,
            cut_based,
            delta_eta_sc: 0.,
            loose: None,
        }
    }

    fn from_record(record: &EventRecord, idx: usize) -> Result<Self> {
        let p4 = from_pt_eta_phi_m(
            record.array_at("Electron_pt", idx)?,
            record.array_at("Electron_eta", idx)?,
            record.array_at("Electron_phi", idx)?,
            record.array_at("Electron_mass", idx)?,
        );
        Ok(Self {
            delta_eta_sc: record.array_at("Electron_deltaEtaSC", idx)?,
            ..Self::new(
                p4,
                idx,
                record.array_int("Electron_charge", idx)?,
                CutBasedId::from_level(record.array_int("Electron_cutBased", idx)?),
            )
        })
    }

    /// Four-momentum
    pub fn p4(&self) -> &Momentum {
        &self.p4
    }

    /// Transverse momentum
    pub fn pt(&self) -> Float {
        self.p4.pt()
    }

    /// Super-cluster pseudorapidity, only used for selection
    pub fn sc_eta(&self) -> Float {
        self.p4.eta() + self.delta_eta_sc
    }

    /// Selection outcome, if selection has run
    pub fn is_loose(&self) -> Option<bool> {
        self.loose
    }

    /// Record the selection outcome
    pub fn set_loose(&mut self, loose: bool) {
        self.loose = Some(loose);
    }
}

/// Read all electrons of an event, in record order
pub fn build_electrons(record: &EventRecord) -> Result<Vec<Electron>> {
    let n_electron = record.count("nElectron")?;
    (0..n_electron)
        .map(|idx| Electron::from_record(record, idx))
        .collect()
}
