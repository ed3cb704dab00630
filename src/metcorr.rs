//! XY-shift correction of the particle-flow missing transverse energy
//!
//! The MET vector picks up a modulation in phi which grows linearly with the
//! number of reconstructed primary vertices. It is removed by subtracting a
//! linear function of that number from each transverse component, with
//! coefficients measured per data-taking period (collision data) or per era
//! (simulation).

use crate::{
    config::Era,
    met::MetValues,
    numeric::{reals::consts::PI, Float},
};

use prefix_num_ops::real::*;

/// Vertex multiplicity beyond which the correction stops growing
const MAX_NPV: usize = 100;

/// Linear coefficients of the shift, per transverse component
#[derive(Clone, Copy, Debug, PartialEq)]
struct XyCoefficients {
    x_slope: Float,
    x_offset: Float,
    y_slope: Float,
    y_offset: Float,
}
//
impl XyCoefficients {
    const fn new(x_slope: Float, x_offset: Float, y_slope: Float, y_offset: Float) -> Self {
        Self {
            x_slope,
            x_offset,
            y_slope,
            y_offset,
        }
    }

    /// Correction to add to (MET_x, MET_y)
    fn correction(&self, npv: Float) -> (Float, Float) {
        (
            -(self.x_slope * npv + self.x_offset),
            -(self.y_slope * npv + self.y_offset),
        )
    }
}

/// Coefficients of the single-muon data-taking periods
const DATA_COEFFICIENTS: [(&str, XyCoefficients); 17] = [
    // 2016, APV-affected runs
    ("SingleMuon_Run2016B_APV_ver2", XyCoefficients::new(-0.0214894, -0.188255, 0.0876624, 0.812885)),
    ("SingleMuon_Run2016C_APV", XyCoefficients::new(-0.032209, 0.067288, 0.113917, 0.743906)),
    ("SingleMuon_Run2016D_APV", XyCoefficients::new(-0.0293663, 0.21106, 0.11331, 0.815787)),
    ("SingleMuon_Run2016E_APV", XyCoefficients::new(-0.0132046, 0.20073, 0.134809, 0.679068)),
    ("SingleMuon_Run2016F_APV", XyCoefficients::new(-0.0543566, 0.816597, 0.114225, 1.17266)),
    // 2016
    ("SingleMuon_Run2016F", XyCoefficients::new(0.134616, -0.89965, 0.0397736, 1.0385)),
    ("SingleMuon_Run2016G", XyCoefficients::new(0.121809, -0.584893, 0.0558974, 0.891234)),
    ("SingleMuon_Run2016H", XyCoefficients::new(0.0868828, -0.703489, 0.0888774, 0.902632)),
    // 2017
    ("SingleMuon_Run2017B", XyCoefficients::new(-0.211161, 0.419333, 0.251789, -1.28089)),
    ("SingleMuon_Run2017C", XyCoefficients::new(-0.185184, -0.164009, 0.200941, -0.56853)),
    ("SingleMuon_Run2017D", XyCoefficients::new(-0.201606, 0.426502, 0.188208, -0.58313)),
    ("SingleMuon_Run2017E", XyCoefficients::new(-0.162472, 0.176329, 0.138076, -0.250239)),
    ("SingleMuon_Run2017F", XyCoefficients::new(-0.210639, 0.72934, 0.198626, 1.028)),
    // 2018
    ("SingleMuon_Run2018A", XyCoefficients::new(0.263733, -1.91115, 0.0431304, -0.112043)),
    ("SingleMuon_Run2018B", XyCoefficients::new(0.400466, -3.05914, 0.146125, -0.533233)),
    ("SingleMuon_Run2018C", XyCoefficients::new(0.430911, -1.42865, 0.0620083, -1.46021)),
    ("SingleMuon_Run2018D", XyCoefficients::new(0.457327, -1.56856, 0.0684071, -0.928372)),
];

/// Coefficients of simulated samples
fn mc_coefficients(era: Era) -> XyCoefficients {
    match era {
        Era::Y2016Apv => XyCoefficients::new(-0.188743, 0.136539, 0.0127927, 0.117747),
        Era::Y2016 => XyCoefficients::new(-0.153497, -0.231751, 0.00731978, 0.243323),
        Era::Y2017 => XyCoefficients::new(-0.300155, 1.90608, 0.300213, -2.02232),
        Era::Y2018 => XyCoefficients::new(-0.183518, 0.546754, 0.192263, -0.42121),
    }
}

/// Shift to add to (MET_x, MET_y) for a sample
///
/// Collision data is looked up by process name, simulation by era. Samples
/// without coefficients get no correction.
pub fn pf_met_xy_correction(process_name: &str, era: Era, is_mc: bool, npv: usize) -> (Float, Float) {
    let npv = npv.min(MAX_NPV) as Float;
    let coefficients = if is_mc {
        Some(mc_coefficients(era))
    } else {
        DATA_COEFFICIENTS
            .iter()
            .find(|(name, _)| *name == process_name)
            .map(|(_, coefficients)| *coefficients)
    };
    coefficients.map_or((0., 0.), |c| c.correction(npv))
}

/// Azimuth of a transverse vector, with the conventions of the correction
/// recipe for vectors along the y axis and the negative x axis
fn corrected_phi(x: Float, y: Float) -> Float {
    if x == 0. && y > 0. {
        PI
    } else if x == 0. && y < 0. {
        -PI
    } else if x > 0. {
        (y / x).atan()
    } else if x < 0. && y > 0. {
        (y / x).atan() + PI
    } else if x < 0. && y < 0. {
        (y / x).atan() - PI
    } else {
        0.
    }
}

/// XY-corrected particle-flow MET as (pt, phi)
pub fn correct_pf_met(
    met: &MetValues,
    process_name: &str,
    era: Era,
    is_mc: bool,
    npv: usize,
) -> (Float, Float) {
    let (dx, dy) = pf_met_xy_correction(process_name, era, is_mc, npv);
    let x = met.pt * cos(met.phi) + dx;
    let y = met.pt * sin(met.phi) + dy;
    (sqrt(x * x + y * y), corrected_phi(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn data_periods_and_simulation() {
        let (dx, dy) = pf_met_xy_correction("SingleMuon_Run2018B", Era::Y2018, false, 20);
        assert_relative_eq!(dx, -(0.400466 * 20. - 3.05914));
        assert_relative_eq!(dy, -(0.146125 * 20. - 0.533233));

        let (dx, dy) = pf_met_xy_correction("WJetsToLNu", Era::Y2017, true, 30);
        assert_relative_eq!(dx, -(-0.300155 * 30. + 1.90608));
        assert_relative_eq!(dy, -(0.300213 * 30. - 2.02232));

        // Data periods are not used for simulation, and vice versa
        assert_eq!(
            pf_met_xy_correction("SingleMuon_Run2018B", Era::Y2018, true, 20),
            pf_met_xy_correction("anything", Era::Y2018, true, 20)
        );
        assert_eq!(
            pf_met_xy_correction("SingleMuon_Run2018E", Era::Y2018, false, 20),
            (0., 0.)
        );
    }

    #[test]
    fn vertex_count_saturates() {
        assert_eq!(
            pf_met_xy_correction("SingleMuon_Run2016G", Era::Y2016, false, 250),
            pf_met_xy_correction("SingleMuon_Run2016G", Era::Y2016, false, 100)
        );
    }

    #[test]
    fn phi_conventions() {
        assert_eq!(corrected_phi(0., 1.), PI);
        assert_eq!(corrected_phi(0., -1.), -PI);
        assert_eq!(corrected_phi(0., 0.), 0.);
        assert_eq!(corrected_phi(-1., 0.), 0.);
        assert_relative_eq!(corrected_phi(1., 1.), PI / 4.);
        assert_relative_eq!(corrected_phi(-1., 1.), 3. * PI / 4.);
        assert_relative_eq!(corrected_phi(-1., -1.), -3. * PI / 4.);
    }

    #[test]
    fn uncorrected_sample_keeps_met() {
        let met = MetValues {
            pt: 40.,
            phi: 2.,
            sum_et: 700.,
        };
        let (pt, phi) = correct_pf_met(&met, "SingleMuon_Run2019A", Era::Y2018, false, 30);
        assert_relative_eq!(pt, 40., max_relative = 1e-12);
        assert_abs_diff_eq!(phi, 2., epsilon = 1e-12);
    }
}
