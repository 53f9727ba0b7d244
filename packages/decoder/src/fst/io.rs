//! CBOR form of [`Fst`], wrapped in a versioned envelope.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use ciborium::{de, ser};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, instrument};

use super::Fst;
use crate::{constants::FST_FORMAT_VERSION, error::FstError};

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u8,
    fst: &'a Fst,
}

#[derive(Deserialize)]
struct Envelope {
    version: u8,
    fst: Fst,
}

fn write_cbor<W: Write, T: Serialize + ?Sized>(w: W, val: &T) -> Result<(), FstError> {
    ser::into_writer(val, w).map_err(|e| FstError::Cbor(e.to_string()))
}
fn read_cbor<R: Read, T: DeserializeOwned>(r: R) -> Result<T, FstError> {
    de::from_reader(r).map_err(|e| FstError::Cbor(e.to_string()))
}

impl Fst {
    /// Atomically write CBOR to `path` (`<file>.tmp` → rename).
    #[instrument(level = "debug", skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), FstError> {
        let path = path.as_ref();
        let tmp = path.with_extension("tmp");
        {
            let f = File::create(&tmp)?;
            let mut bw = BufWriter::new(f);
            self.write_to(&mut bw)?;
            bw.flush()?;
        }
        fs::rename(&tmp, path)?;
        debug!(states = self.num_states(), "automaton saved");
        Ok(())
    }

    /// Serialize into an in-memory CBOR buffer.
    pub fn save_to_buffer(&self) -> Result<Vec<u8>, FstError> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    /// Load a file produced by [`Fst::save_to_file`]; the result is validated.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, FstError> {
        let f = File::open(path)?;
        Self::read_from(BufReader::new(f))
    }

    pub fn load_from_buffer(buf: &[u8]) -> Result<Self, FstError> {
        Self::read_from(BufReader::new(buf))
    }

    fn write_to<W: Write>(&self, w: W) -> Result<(), FstError> {
        write_cbor(
            w,
            &EnvelopeRef {
                version: FST_FORMAT_VERSION,
                fst: self,
            },
        )
    }

    fn read_from<R: Read>(r: R) -> Result<Self, FstError> {
        let Envelope { version, fst } = read_cbor(r)?;
        if version != FST_FORMAT_VERSION {
            return Err(FstError::Version {
                found: version,
                expected: FST_FORMAT_VERSION,
            });
        }
        fst.validate()?;
        Ok(fst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fst::ArcSort, semiring::SemiringKind};

    fn sample() -> Fst {
        let mut f = Fst::from_text(
            SemiringKind::Log,
            "0 1 A X 0.25\n0 2 B Y 1.5\n1 2 <eps> Z\n2 0.75\n",
        )
        .unwrap();
        f.arc_sort(ArcSort::Output);
        f
    }

    #[test]
    fn buffer_round_trip() {
        let f = sample();
        let back = Fst::load_from_buffer(&f.save_to_buffer().unwrap()).unwrap();
        assert!(f.structurally_eq(&back, 0.0));
        assert_eq!(back.arc_sort_order(), Some(ArcSort::Output));
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let f = sample();
        let mut buf = Vec::new();
        write_cbor(
            &mut buf,
            &EnvelopeRef {
                version: FST_FORMAT_VERSION + 1,
                fst: &f,
            },
        )
        .unwrap();
        assert!(matches!(
            Fst::load_from_buffer(&buf),
            Err(FstError::Version { .. })
        ));
    }

    #[test]
    fn garbage_is_a_cbor_error() {
        assert!(matches!(
            Fst::load_from_buffer(b"\xff\x00not cbor"),
            Err(FstError::Cbor(_))
        ));
    }
}
