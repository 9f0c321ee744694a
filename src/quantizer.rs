//! Scale Quantizer
//!
//! Snaps a semitone pitch to the nearest degree of a musical scale. Ties
//! between two equally distant degrees resolve to whichever degree comes
//! first in the scale's interval list, checking the degree itself before its
//! octave-up and octave-down neighbours. Existing patterns depend on that
//! order, so the interval lists must not be re-sorted.

/// Musical scales for quantization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scale {
    /// Chromatic pass-through
    #[default]
    Off,
    Major,
    Minor,
    HarmonicMinor,
    PentatonicMajor,
    PentatonicMinor,
    Blues,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Locrian,
    WholeTone,
}

impl Scale {
    pub const ALL: [Scale; 13] = [
        Scale::Off,
        Scale::Major,
        Scale::Minor,
        Scale::HarmonicMinor,
        Scale::PentatonicMajor,
        Scale::PentatonicMinor,
        Scale::Blues,
        Scale::Dorian,
        Scale::Phrygian,
        Scale::Lydian,
        Scale::Mixolydian,
        Scale::Locrian,
        Scale::WholeTone,
    ];

    /// Decode an integer-coded choice; unknown codes mean no quantization.
    pub fn from_index(index: i64) -> Self {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .unwrap_or(Scale::Off)
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Scale::Off => "Off",
            Scale::Major => "Major",
            Scale::Minor => "Minor",
            Scale::HarmonicMinor => "Harmonic Minor",
            Scale::PentatonicMajor => "Pentatonic Major",
            Scale::PentatonicMinor => "Pentatonic Minor",
            Scale::Blues => "Blues",
            Scale::Dorian => "Dorian",
            Scale::Phrygian => "Phrygian",
            Scale::Lydian => "Lydian",
            Scale::Mixolydian => "Mixolydian",
            Scale::Locrian => "Locrian",
            Scale::WholeTone => "Whole Tone",
        }
    }

    /// Semitone offsets of the scale degrees relative to the root.
    pub fn semitones(self) -> &'static [i32] {
        match self {
            Scale::Off => &[],
            Scale::Major => &[0, 2, 4, 5, 7, 9, 11],
            Scale::Minor => &[0, 2, 3, 5, 7, 8, 10],
            Scale::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            Scale::PentatonicMajor => &[0, 2, 4, 7, 9],
            Scale::PentatonicMinor => &[0, 3, 5, 7, 10],
            Scale::Blues => &[0, 3, 5, 6, 7, 10],
            Scale::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Scale::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            Scale::Lydian => &[0, 2, 4, 6, 7, 9, 11],
            Scale::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            Scale::Locrian => &[0, 1, 3, 5, 6, 8, 10],
            Scale::WholeTone => &[0, 2, 4, 6, 8, 10],
        }
    }
}

/// Snap `pitch` (semitones) to `scale` transposed to `root` (0 = C .. 11 = B).
pub fn quantize(pitch: f64, scale: Scale, root: i32) -> f64 {
    let degrees = scale.semitones();
    if degrees.is_empty() || !pitch.is_finite() {
        return pitch;
    }

    let root = root.clamp(0, 11) as f64;
    let shifted = pitch - root;

    let mut octave = libm::floor(shifted / 12.0);
    let mut within = shifted - octave * 12.0;
    if within < 0.0 {
        within += 12.0;
        octave -= 1.0;
    }

    let mut closest = 0.0;
    let mut min_distance = f64::MAX;
    for &degree in degrees {
        let degree = degree as f64;
        for candidate in [degree, degree + 12.0, degree - 12.0] {
            let distance = (within - candidate).abs();
            if distance < min_distance {
                min_distance = distance;
                closest = candidate;
            }
        }
    }

    octave * 12.0 + closest + root
}
