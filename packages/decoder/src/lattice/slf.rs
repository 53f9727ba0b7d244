//! HTK Standard Lattice Format export.
//!
//! ```text
//! VERSION=1.0
//! base=e
//! N=4 L=4
//! I=0 t=0.00 W=<s>
//! I=1 t=0.03 W=LEFT
//! J=0 S=0 E=1 a=-12.50 l=-0.69
//! ```
//!
//! Node times are end times in seconds; `a` and `l` are natural-log
//! probabilities whatever the lattice semiring.

use std::io::Write;

use super::Lattice;
use crate::{constants::SLF_FRAMES_PER_SECOND, error::LatticeError, semiring::Semiring};

impl Lattice {
    pub fn write_slf<W: Write>(&self, mut out: W) -> Result<(), LatticeError> {
        self.validate()?;
        let s = self.semiring;
        writeln!(out, "VERSION=1.0")?;
        writeln!(out, "base=e")?;
        if let (Some(i), Some(t)) = (self.initial, self.terminal) {
            writeln!(out, "start={i}")?;
            writeln!(out, "end={t}")?;
        }
        writeln!(out, "N={} L={}", self.nodes.len(), self.edges.len())?;
        for (id, n) in self.nodes.iter().enumerate() {
            writeln!(
                out,
                "I={id} t={:.2} W={}",
                n.end as f32 / SLF_FRAMES_PER_SECOND,
                n.word
            )?;
        }
        for (id, e) in self.edges.iter().enumerate() {
            writeln!(
                out,
                "J={id} S={} E={} a={:.4} l={:.4}",
                e.from,
                e.to,
                s.to_ln_probability(e.acoustic),
                s.to_ln_probability(e.language)
            )?;
        }
        Ok(())
    }

    pub fn to_slf_string(&self) -> Result<String, LatticeError> {
        let mut buf = Vec::new();
        self.write_slf(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
