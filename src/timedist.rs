//! Stochastic time models for station service and transfer times.
//!
//! Every duration in the production system (how long a station works on a
//! tray, how long a transfer link takes) is a `TimeDist`. Routing uses the
//! closed-form expected value; simulation clients use sampling.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, Normal, Weibull};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MesError;

/// Process-wide generator backing [`TimeDist::sample_shared`]. Seeded once
/// at first use.
static SHARED_RNG: Lazy<Mutex<StdRng>> = Lazy::new(|| Mutex::new(StdRng::from_entropy()));

/// A stochastic time model.
///
/// Parameters are typed per variant, so a distribution that deserialized
/// successfully always has the right arity. Values that violate a variant's
/// numeric preconditions (a non-positive rate, say) are still representable;
/// both [`sample`](Self::sample) and [`expected`](Self::expected) fall back
/// to `0.0` for those.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeDist {
    /// Fixed duration
    Constant(f64),
    /// Uniform on `[a, b]`; swapped bounds are tolerated
    Uniform(f64, f64),
    /// Normal with mean and standard deviation
    Normal(f64, f64),
    /// Exponential with rate `lambda`
    Exponential(f64),
    /// Weibull with shape `k` and scale `lambda`
    Weibull(f64, f64),
    /// Triangular on `[a, b]` with mode `c`
    Triangular(f64, f64, f64),
}

impl TimeDist {
    /// Closed-form expected value, used as the deterministic edge weight in
    /// routing. Returns `0.0` when parameters violate the variant's
    /// preconditions.
    pub fn expected(&self) -> f64 {
        match *self {
            TimeDist::Constant(v) => v,
            TimeDist::Uniform(a, b) => (a + b) / 2.0,
            TimeDist::Normal(mu, _) => mu,
            TimeDist::Exponential(lambda) => {
                if lambda > 0.0 {
                    1.0 / lambda
                } else {
                    0.0
                }
            }
            TimeDist::Weibull(k, lambda) => {
                if k > 0.0 && lambda > 0.0 {
                    lambda * statrs::function::gamma::gamma(1.0 + 1.0 / k)
                } else {
                    0.0
                }
            }
            TimeDist::Triangular(a, b, c) => (a + b + c) / 3.0,
        }
    }

    /// Draw one duration. Never negative; degenerate parameters yield `0.0`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            TimeDist::Constant(v) => v.max(0.0),
            TimeDist::Uniform(a, b) => {
                let (lo, hi) = if b < a { (b, a) } else { (a, b) };
                if lo < hi {
                    rng.gen_range(lo..hi).max(0.0)
                } else {
                    0.0
                }
            }
            TimeDist::Normal(mu, sigma) => match Normal::new(mu, sigma) {
                Ok(dist) => dist.sample(rng).max(0.0),
                Err(_) => 0.0,
            },
            TimeDist::Exponential(lambda) => {
                if lambda > 0.0 {
                    match Exp::new(lambda) {
                        Ok(dist) => dist.sample(rng).max(0.0),
                        Err(_) => 0.0,
                    }
                } else {
                    0.0
                }
            }
            TimeDist::Weibull(k, lambda) => {
                if k > 0.0 && lambda > 0.0 {
                    match Weibull::new(lambda, k) {
                        Ok(dist) => dist.sample(rng).max(0.0),
                        Err(_) => 0.0,
                    }
                } else {
                    0.0
                }
            }
            TimeDist::Triangular(a, b, c) => {
                let (lo, hi) = if b < a { (b, a) } else { (a, b) };
                if !(lo < hi) {
                    return 0.0;
                }
                let mode = c.clamp(lo, hi);
                // Inverse CDF over U(0,1)
                let u: f64 = rng.gen();
                let f_c = (mode - lo) / (hi - lo);
                let x = if u < f_c {
                    lo + (u * (hi - lo) * (mode - lo)).sqrt()
                } else {
                    hi - ((1.0 - u) * (hi - lo) * (hi - mode)).sqrt()
                };
                x.max(0.0)
            }
        }
    }

    /// Draw one duration from the process-wide generator.
    pub fn sample_shared(&self) -> f64 {
        let mut rng = SHARED_RNG.lock();
        self.sample(&mut *rng)
    }

    /// The configuration name of the variant.
    pub fn kind_str(&self) -> &'static str {
        match self {
            TimeDist::Constant(_) => "constant",
            TimeDist::Uniform(..) => "uniform",
            TimeDist::Normal(..) => "normal",
            TimeDist::Exponential(_) => "exponential",
            TimeDist::Weibull(..) => "weibull",
            TimeDist::Triangular(..) => "triangular",
        }
    }

    /// The parameters in configuration order.
    pub fn params(&self) -> Vec<f64> {
        match *self {
            TimeDist::Constant(v) => vec![v],
            TimeDist::Uniform(a, b) => vec![a, b],
            TimeDist::Normal(mu, sigma) => vec![mu, sigma],
            TimeDist::Exponential(lambda) => vec![lambda],
            TimeDist::Weibull(k, lambda) => vec![k, lambda],
            TimeDist::Triangular(a, b, c) => vec![a, b, c],
        }
    }
}

/// Raw configuration shape: `{"type": "normal", "parameters": [5.0, 1.0]}`.
#[derive(Serialize, Deserialize)]
struct RawTimeDist {
    #[serde(rename = "type")]
    kind: String,
    parameters: Vec<f64>,
}

impl TryFrom<RawTimeDist> for TimeDist {
    type Error = MesError;

    fn try_from(raw: RawTimeDist) -> Result<Self, MesError> {
        let arity_err = |want: usize| {
            MesError::Config(format!(
                "distribution '{}' expects {} parameter(s), got {}",
                raw.kind,
                want,
                raw.parameters.len()
            ))
        };
        let p = &raw.parameters;
        match raw.kind.as_str() {
            "constant" => p.first().copied().map(TimeDist::Constant).ok_or_else(|| arity_err(1)),
            "uniform" => match p[..] {
                [a, b, ..] => Ok(TimeDist::Uniform(a, b)),
                _ => Err(arity_err(2)),
            },
            "normal" => match p[..] {
                [mu, sigma, ..] => Ok(TimeDist::Normal(mu, sigma)),
                _ => Err(arity_err(2)),
            },
            "exponential" => p.first().copied().map(TimeDist::Exponential).ok_or_else(|| arity_err(1)),
            "weibull" => match p[..] {
                [k, lambda, ..] => Ok(TimeDist::Weibull(k, lambda)),
                _ => Err(arity_err(2)),
            },
            "triangular" => match p[..] {
                [a, b, c, ..] => Ok(TimeDist::Triangular(a, b, c)),
                _ => Err(arity_err(3)),
            },
            other => Err(MesError::Config(format!("unknown distribution type '{other}'"))),
        }
    }
}

impl<'de> Deserialize<'de> for TimeDist {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawTimeDist::deserialize(deserializer)?;
        TimeDist::try_from(raw).map_err(D::Error::custom)
    }
}

impl Serialize for TimeDist {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        RawTimeDist {
            kind: self.kind_str().to_string(),
            parameters: self.params(),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_expected_values() {
        assert_eq!(TimeDist::Constant(3.5).expected(), 3.5);
        assert_eq!(TimeDist::Uniform(2.0, 4.0).expected(), 3.0);
        assert_eq!(TimeDist::Normal(5.0, 1.0).expected(), 5.0);
        assert_eq!(TimeDist::Exponential(2.0).expected(), 0.5);
        assert_eq!(TimeDist::Triangular(1.0, 5.0, 3.0).expected(), 3.0);
        // weibull(1, lambda) is exponential with mean lambda
        let w = TimeDist::Weibull(1.0, 2.0).expected();
        assert!((w - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_expected_rejects_bad_parameters() {
        assert_eq!(TimeDist::Exponential(0.0).expected(), 0.0);
        assert_eq!(TimeDist::Exponential(-1.0).expected(), 0.0);
        assert_eq!(TimeDist::Weibull(0.0, 2.0).expected(), 0.0);
        assert_eq!(TimeDist::Weibull(2.0, -1.0).expected(), 0.0);
    }

    #[test]
    fn test_samples_are_non_negative() {
        let mut rng = rng();
        let dists = [
            TimeDist::Constant(-1.0),
            TimeDist::Uniform(-10.0, -5.0),
            TimeDist::Normal(0.0, 10.0),
            TimeDist::Exponential(0.5),
            TimeDist::Weibull(2.0, 3.0),
            TimeDist::Triangular(-5.0, 5.0, 0.0),
        ];
        for dist in &dists {
            for _ in 0..200 {
                assert!(dist.sample(&mut rng) >= 0.0, "negative sample from {dist:?}");
            }
        }
    }

    #[test]
    fn test_uniform_tolerates_swapped_bounds() {
        let mut rng = rng();
        for _ in 0..100 {
            let x = TimeDist::Uniform(4.0, 2.0).sample(&mut rng);
            assert!((2.0..4.0).contains(&x));
        }
        // degenerate interval
        assert_eq!(TimeDist::Uniform(3.0, 3.0).sample(&mut rng), 0.0);
    }

    #[test]
    fn test_triangular_stays_in_support() {
        let mut rng = rng();
        for _ in 0..500 {
            let x = TimeDist::Triangular(1.0, 4.0, 2.0).sample(&mut rng);
            assert!((1.0..=4.0).contains(&x));
        }
        // mode outside the interval is clamped in
        for _ in 0..100 {
            let x = TimeDist::Triangular(1.0, 4.0, 9.0).sample(&mut rng);
            assert!((1.0..=4.0).contains(&x));
        }
    }

    #[test]
    fn test_sample_shared_is_usable() {
        assert!(TimeDist::Constant(2.0).sample_shared() >= 0.0);
    }

    #[test]
    fn test_serde_round_trip() {
        let dist = TimeDist::Normal(5.0, 1.0);
        let json = serde_json::to_string(&dist).unwrap();
        assert_eq!(json, r#"{"type":"normal","parameters":[5.0,1.0]}"#);
        let back: TimeDist = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dist);
    }

    #[test]
    fn test_deserialize_rejects_unknown_type() {
        let err = serde_json::from_str::<TimeDist>(r#"{"type":"lognormal","parameters":[1.0]}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_deserialize_rejects_wrong_arity() {
        let err = serde_json::from_str::<TimeDist>(r#"{"type":"normal","parameters":[1.0]}"#);
        assert!(err.is_err());
        let err = serde_json::from_str::<TimeDist>(r#"{"type":"triangular","parameters":[1.0,2.0]}"#);
        assert!(err.is_err());
    }
}
