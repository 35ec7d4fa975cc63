pub mod air_eq;
pub mod curve_bank;
pub mod engine;
pub mod envelope;
pub mod limiter;
pub mod saturation;
pub mod smoother;
pub mod tilt_eq;
pub mod utils;

pub use air_eq::{AirEq, AirState};
pub use curve_bank::{ChaosRng, CurveBank, CurveShape};
pub use engine::{DustPress, EngineSettings, TelemetrySample};
pub use envelope::EnvelopeFollower;
pub use limiter::{GainStage, LimiterChannel, LookaheadLimiter};
pub use saturation::SoftSaturation;
pub use smoother::ParamSmoother;
pub use tilt_eq::{TiltEq, TiltState};
