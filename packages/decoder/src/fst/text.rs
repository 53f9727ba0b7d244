//! Textual arc-list format.
//!
//! ```text
//! # src dst ilabel olabel [weight]
//! 0 1 HELLO HELLO 0.5
//! 1 2 WORLD WORLD
//! # state [weight]
//! 2
//! ```
//!
//! The source of the first arc line is the start state (or the first final
//! line's state when there are no arcs). Omitted weights are `one()`.

use std::{
    collections::HashSet,
    fmt::Write as _,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use tracing::{debug, instrument};

use super::{Fst, StateId};
use crate::{
    error::FstError,
    semiring::{Semiring, SemiringKind},
};

enum Line<'a> {
    Arc {
        src: StateId,
        dst: StateId,
        isym: &'a str,
        osym: &'a str,
        weight: f32,
    },
    Final {
        state: StateId,
        weight: f32,
    },
}

impl Fst {
    /// Parse the text format.
    pub fn from_text(semiring: SemiringKind, text: &str) -> Result<Self, FstError> {
        Self::read_text(semiring, text.as_bytes())
    }

    /// Parse the text format from a file.
    pub fn load_text_file<P: AsRef<Path>>(
        semiring: SemiringKind,
        path: P,
    ) -> Result<Self, FstError> {
        let f = File::open(path)?;
        Self::read_text(semiring, BufReader::new(f))
    }

    /// Parse the text format from any buffered reader.
    #[instrument(level = "debug", skip(reader))]
    pub fn read_text<R: BufRead>(semiring: SemiringKind, reader: R) -> Result<Self, FstError> {
        let mut fst = Fst::new(semiring);
        let mut arcs = Vec::new();
        let mut finals = Vec::new();
        let mut defined = HashSet::new();
        let mut start = None;
        let mut max_state = None::<StateId>;

        for (idx, line) in reader.lines().enumerate() {
            let lineno = idx + 1;
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match parse_line(semiring, trimmed, lineno)? {
                Line::Arc {
                    src,
                    dst,
                    isym,
                    osym,
                    weight,
                } => {
                    start.get_or_insert(src);
                    defined.insert(src);
                    max_state = max_state.max(Some(src.max(dst)));
                    let ilabel = fst.isyms.intern(isym);
                    let olabel = fst.osyms.intern(osym);
                    arcs.push((lineno, src, dst, ilabel, olabel, weight));
                }
                Line::Final { state, weight } => {
                    defined.insert(state);
                    max_state = max_state.max(Some(state));
                    finals.push((state, weight));
                }
            }
        }

        let start = start
            .or_else(|| finals.first().map(|&(s, _)| s))
            .ok_or_else(|| FstError::structural("no start state"))?;
        if finals.is_empty() {
            return Err(FstError::structural("no final state"));
        }

        if let Some(&(lineno, _, dst, ..)) = arcs.iter().find(|a| !defined.contains(&a.2)) {
            return Err(FstError::structural(format!(
                "line {lineno}: destination state {dst} is never defined"
            )));
        }
        // every id is defined by now, so ids are dense iff the largest is len - 1
        let max_state = max_state.unwrap_or(start);
        if max_state != defined.len() - 1 {
            return Err(FstError::structural(format!(
                "state ids are not dense: {} states defined but the largest id is {max_state}",
                defined.len()
            )));
        }

        for _ in 0..defined.len() {
            fst.add_state();
        }
        for (_, src, dst, ilabel, olabel, weight) in arcs {
            fst.add_arc(src, ilabel, olabel, weight, dst)?;
        }
        for (state, weight) in finals {
            fst.set_final(state, weight)?;
        }
        fst.set_start(start)?;
        fst.validate()?;

        debug!(
            states = fst.num_states(),
            arcs = fst.num_arcs(),
            "parsed text automaton"
        );
        Ok(fst)
    }

    /// Render in the text format; `from_text(to_text(f))` reproduces `f`.
    ///
    /// Fails when the start state has no arcs but other states do, since the
    /// start state is implied by the first arc line.
    pub fn to_text(&self) -> Result<String, FstError> {
        let start = self
            .start
            .ok_or_else(|| FstError::structural("no start state"))?;
        if self.arcs(start).is_empty() && self.num_arcs() > 0 {
            return Err(FstError::structural(
                "start state without arcs cannot be expressed in text form",
            ));
        }
        let one = self.semiring.one();
        let mut out = String::new();

        let order = std::iter::once(start).chain((0..self.num_states()).filter(|&s| s != start));
        for s in order {
            for a in self.arcs(s) {
                let isym = self.isyms.symbol(a.ilabel).ok_or_else(|| {
                    FstError::structural(format!("input label {} has no symbol", a.ilabel))
                })?;
                let osym = self.osyms.symbol(a.olabel).ok_or_else(|| {
                    FstError::structural(format!("output label {} has no symbol", a.olabel))
                })?;
                // `write!` into a String is infallible
                let _ = if a.weight == one {
                    writeln!(out, "{s} {} {isym} {osym}", a.nextstate)
                } else {
                    writeln!(out, "{s} {} {isym} {osym} {}", a.nextstate, a.weight)
                };
            }
        }
        for (s, st) in self.states() {
            if st.final_weight == self.semiring.zero() {
                continue;
            }
            let _ = if st.final_weight == one {
                writeln!(out, "{s}")
            } else {
                writeln!(out, "{s} {}", st.final_weight)
            };
        }
        Ok(out)
    }
}

fn parse_line(semiring: SemiringKind, line: &str, lineno: usize) -> Result<Line<'_>, FstError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    match fields.as_slice() {
        [src, dst, isym, osym] => Ok(Line::Arc {
            src: parse_state(src, lineno)?,
            dst: parse_state(dst, lineno)?,
            isym: *isym,
            osym: *osym,
            weight: semiring.one(),
        }),
        [src, dst, isym, osym, w] => Ok(Line::Arc {
            src: parse_state(src, lineno)?,
            dst: parse_state(dst, lineno)?,
            isym: *isym,
            osym: *osym,
            weight: parse_weight(semiring, w, lineno)?,
        }),
        [state] => Ok(Line::Final {
            state: parse_state(state, lineno)?,
            weight: semiring.one(),
        }),
        [state, w] => Ok(Line::Final {
            state: parse_state(state, lineno)?,
            weight: parse_weight(semiring, w, lineno)?,
        }),
        other => Err(FstError::format(
            lineno,
            format!("expected 1, 2, 4 or 5 fields, found {}", other.len()),
        )),
    }
}

fn parse_state(field: &str, lineno: usize) -> Result<StateId, FstError> {
    field
        .parse()
        .map_err(|_| FstError::format(lineno, format!("`{field}` is not a state id")))
}

fn parse_weight(semiring: SemiringKind, field: &str, lineno: usize) -> Result<f32, FstError> {
    let w: f32 = field
        .parse()
        .map_err(|_| FstError::format(lineno, format!("`{field}` is not a weight")))?;
    if semiring.is_member(w) {
        Ok(w)
    } else {
        Err(FstError::format(
            lineno,
            format!("weight {w} is not a member of the {semiring} semiring"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = "\
# greeting grammar
0 1 HELLO HELLO 0.5
1 2 WORLD WORLD

1 3 <eps> <eps> 2.25
2
3 1.5
";

    #[test]
    fn parses_arcs_and_finals() {
        let f = Fst::from_text(SemiringKind::Tropical, HELLO).unwrap();
        assert_eq!(f.start(), Some(0));
        assert_eq!(f.num_states(), 4);
        assert_eq!(f.num_arcs(), 3);
        assert_eq!(f.final_weight(2), 0.0);
        assert_eq!(f.final_weight(3), 1.5);
        assert!(!f.is_final(1));
        assert_eq!(f.arcs(1)[1].ilabel, 0);
    }

    #[test]
    fn text_round_trip() {
        let f = Fst::from_text(SemiringKind::Tropical, HELLO).unwrap();
        let again = Fst::from_text(SemiringKind::Tropical, &f.to_text().unwrap()).unwrap();
        assert!(f.structurally_eq(&again, 1e-6));
    }

    #[test]
    fn wrong_field_count_names_the_line() {
        let err = Fst::from_text(SemiringKind::Tropical, "0 1 A A 0\n1 2 B\n1\n").unwrap_err();
        assert!(matches!(err, FstError::Format { line: 2, .. }), "{err}");
    }

    #[test]
    fn undefined_destination_is_structural() {
        let err = Fst::from_text(SemiringKind::Tropical, "0 1 A A\n0 7 B B\n1\n").unwrap_err();
        assert!(matches!(err, FstError::Structural(_)), "{err}");
    }

    #[test]
    fn huge_state_ids_fail_before_allocating() {
        let err = Fst::from_text(SemiringKind::Tropical, "0 20000000 A A\n0\n").unwrap_err();
        assert!(matches!(err, FstError::Structural(_)), "{err}");

        let line = format!("0 {} A A\n0\n", usize::MAX);
        let err = Fst::from_text(SemiringKind::Tropical, &line).unwrap_err();
        assert!(matches!(err, FstError::Structural(_)), "{err}");
    }

    #[test]
    fn gaps_in_state_ids_are_structural() {
        let err = Fst::from_text(SemiringKind::Tropical, "0 0 A A\n20000000\n").unwrap_err();
        assert!(err.to_string().contains("not dense"), "{err}");

        let err = Fst::from_text(SemiringKind::Tropical, "0 2 A A\n2\n").unwrap_err();
        assert!(matches!(err, FstError::Structural(_)), "{err}");
    }

    #[test]
    fn nan_weight_is_a_format_error() {
        let err = Fst::from_text(SemiringKind::Log, "0 1 A A NaN\n1\n").unwrap_err();
        assert!(matches!(err, FstError::Format { line: 1, .. }), "{err}");
    }

    #[test]
    fn missing_final_is_structural() {
        let err = Fst::from_text(SemiringKind::Tropical, "0 0 A A\n").unwrap_err();
        assert!(matches!(err, FstError::Structural(_)), "{err}");
    }
}
