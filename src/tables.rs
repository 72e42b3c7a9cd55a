//! Channel curves for the darkroom transform.

/// Number of entries in every channel curve.
pub const TABLE_SIZE: usize = 256;

/// The red, green and blue transfer curves pushed to each display.
///
/// Index is the input intensity level, value is the output level in `[0.0, 1.0]`.
/// The three curves are always built together.
#[derive(Debug, Clone, PartialEq)]
pub struct GammaTables {
    /// Red channel curve.
    pub red: [f32; TABLE_SIZE],
    /// Green channel curve.
    pub green: [f32; TABLE_SIZE],
    /// Blue channel curve.
    pub blue: [f32; TABLE_SIZE],
}

impl GammaTables {
    /// Build the darkroom curves: inverted red, green and blue blacked out.
    ///
    /// Deterministic; every call yields bit-identical tables.
    pub fn darkroom() -> Self {
        let mut red = [0.0f32; TABLE_SIZE];
        for (i, value) in red.iter_mut().enumerate() {
            let t = i as f32 / (TABLE_SIZE - 1) as f32;
            *value = 1.0 - t;
        }

        Self {
            red,
            green: [0.0; TABLE_SIZE],
            blue: [0.0; TABLE_SIZE],
        }
    }

    /// The identity curves (output equals input on every channel).
    pub fn identity() -> Self {
        let mut ramp = [0.0f32; TABLE_SIZE];
        for (i, value) in ramp.iter_mut().enumerate() {
            *value = i as f32 / (TABLE_SIZE - 1) as f32;
        }

        Self {
            red: ramp,
            green: ramp,
            blue: ramp,
        }
    }

    /// Convert to 16-bit ramps, the format GDI gamma ramps use.
    pub fn to_u16_ramps(&self) -> [[u16; TABLE_SIZE]; 3] {
        let mut ramps = [[0u16; TABLE_SIZE]; 3];
        for (ramp, curve) in ramps.iter_mut().zip([&self.red, &self.green, &self.blue]) {
            for (out, value) in ramp.iter_mut().zip(curve.iter()) {
                *out = (value.clamp(0.0, 1.0) * u16::MAX as f32).round() as u16;
            }
        }
        ramps
    }
}
