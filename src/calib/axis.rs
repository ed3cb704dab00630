//! Binned axes shared by calibration tables and output histograms

use crate::{numeric::Float, Result};

use eyre::ensure;
use serde::Serialize;

/// Where a value falls with respect to an axis
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinPosition {
    /// Below the first edge (or not a number)
    Underflow,

    /// Inside regular bin number N, counting from 0
    Bin(usize),

    /// At or above the last edge
    Overflow,
}

/// Axis defined by a strictly increasing list of bin edges
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Axis {
    edges: Vec<Float>,
}
//
impl Axis {
    /// Build an axis from explicit bin edges
    pub fn new(edges: Vec<Float>) -> Result<Self> {
        ensure!(edges.len() >= 2, "An axis needs at least two bin edges");
        ensure!(
            edges.windows(2).all(|w| w[0] < w[1]),
            "Axis bin edges must be strictly increasing"
        );
        Ok(Self { edges })
    }

    /// Build an axis of `n_bins` equal bins spanning [min, max)
    pub fn uniform(n_bins: usize, min: Float, max: Float) -> Self {
        assert!(n_bins > 0 && min < max, "Invalid uniform axis");
        let width = (max - min) / n_bins as Float;
        let mut edges = (0..n_bins)
            .map(|bin| min + bin as Float * width)
            .collect::<Vec<_>>();
        edges.push(max);
        Self { edges }
    }

    /// Number of regular bins
    pub fn num_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Lower edge of the first bin
    pub fn min(&self) -> Float {
        self.edges[0]
    }

    /// Upper edge of the last bin
    pub fn max(&self) -> Float {
        self.edges[self.edges.len() - 1]
    }

    /// Bin edges
    pub fn edges(&self) -> &[Float] {
        &self.edges[..]
    }

    /// Locate a value, bins being closed on the left and open on the right
    pub fn locate(&self, x: Float) -> BinPosition {
        // Written so that NaN ends up in the underflow bin
        if !(x >= self.min()) {
            BinPosition::Underflow
        } else if x >= self.max() {
            BinPosition::Overflow
        } else {
            // First edge strictly above x, minus one
            let above = self.edges.partition_point(|&edge| edge <= x);
            BinPosition::Bin(above - 1)
        }
    }

    /// Regular bin containing a value, if any
    pub fn find_bin(&self, x: Float) -> Option<usize> {
        match self.locate(x) {
            BinPosition::Bin(bin) => Some(bin),
            BinPosition::Underflow | BinPosition::Overflow => None,
        }
    }

    /// Bring a value inside the axis range before a table lookup
    ///
    /// Values at or above the upper edge are moved slightly below it, so that
    /// they land in the last regular bin rather than in the overflow bin.
    pub fn clamp(&self, x: Float) -> Float {
        let (min, max) = (self.min(), self.max());
        if x >= max {
            max - max / 1000.
        } else if x < min {
            min
        } else {
            x
        }
    }

    /// Regular bin holding a value after clamping
    pub fn clamped_bin(&self, x: Float) -> usize {
        self.find_bin(self.clamp(x)).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn variable_axis() {
        let axis = Axis::new(vec![15., 20., 25., 30., 40., 50., 60., 120.]).unwrap();
        assert_eq!(axis.num_bins(), 7);
        assert_eq!(axis.locate(14.9), BinPosition::Underflow);
        assert_eq!(axis.locate(15.), BinPosition::Bin(0));
        assert_eq!(axis.locate(30.), BinPosition::Bin(3));
        assert_eq!(axis.locate(119.9), BinPosition::Bin(6));
        assert_eq!(axis.locate(120.), BinPosition::Overflow);
        assert_eq!(axis.locate(Float::NAN), BinPosition::Underflow);
        assert!(Axis::new(vec![1., 1.]).is_err());
        assert!(Axis::new(vec![1.]).is_err());
    }

    #[test]
    fn clamping() {
        let axis = Axis::new(vec![0., 0.9, 1.2, 2.1, 2.4]).unwrap();
        assert_relative_eq!(axis.clamp(2.4), 2.3976);
        assert_relative_eq!(axis.clamp(3.0), 2.3976);
        assert_eq!(axis.clamp(-1.), 0.);
        assert_eq!(axis.clamped_bin(2.4), 3);
        assert_eq!(axis.clamped_bin(1.0), 1);
    }

    #[test]
    fn uniform_axis() {
        let axis = Axis::uniform(72, -std::f64::consts::PI, std::f64::consts::PI);
        assert_eq!(axis.num_bins(), 72);
        assert_eq!(axis.find_bin(0.01), Some(36));
        assert_eq!(axis.find_bin(std::f64::consts::PI), None);
        assert_eq!(axis.max(), std::f64::consts::PI);
    }
}
