use serde::Serialize;

// ---------------------------------------------------------------------------
// Colour-scale domain hint
// ---------------------------------------------------------------------------

/// Observed value range of a choropleth layer. The presentation layer picks
/// the colours; this only tells it what range to spread them over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleDomain {
    pub min: f64,
    pub max: f64,
}

impl ScaleDomain {
    /// Min/max over finite values; `None` when there are none.
    pub fn observed<I: IntoIterator<Item = f64>>(values: I) -> Option<Self> {
        values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some(ScaleDomain { min: v, max: v }),
                Some(d) => Some(ScaleDomain {
                    min: d.min.min(v),
                    max: d.max.max(v),
                }),
            })
    }

    /// Extend the domain down (or up) to include zero, for sequential
    /// scales anchored at 0.
    pub fn anchored_at_zero(self) -> Self {
        ScaleDomain {
            min: self.min.min(0.0),
            max: self.max.max(0.0),
        }
    }
}
