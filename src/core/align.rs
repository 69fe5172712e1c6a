//! Positional alignment of reference and hypothesis songs.

use crate::core::error::AlignmentError;
use crate::core::segment::{is_stanza_break, Unit};

/// Checks that both corpora split into the same number of songs.
///
/// Line counts inside a song are not compared; adapters pair lines with [`line_pairs`].
pub fn validate(reference: &[Unit], hypothesis: &[Unit]) -> Result<(), AlignmentError> {
    if reference.len() != hypothesis.len() {
        return Err(AlignmentError {
            reference: reference.len(),
            hypothesis: hypothesis.len(),
        });
    }
    Ok(())
}

/// Line pairs of one aligned song, up to the shorter side, with stanza-break
/// positions (on either side) skipped. Yields `(position, reference, hypothesis)`.
pub fn line_pairs<'a>(
    reference: &'a Unit,
    hypothesis: &'a Unit,
) -> impl Iterator<Item = (usize, &'a str, &'a str)> + 'a {
    reference
        .iter()
        .zip(hypothesis.iter())
        .enumerate()
        .filter(|(_, (r, h))| !is_stanza_break(r) && !is_stanza_break(h))
        .map(|(i, (r, h))| (i, r.as_str(), h.as_str()))
}
