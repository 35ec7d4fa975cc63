mod debug;
pub mod dsp;

use crate::dsp::engine::{
    DEFAULT_BIAS, DEFAULT_CEILING_DB, DEFAULT_CHAOS, DEFAULT_DIRT, DEFAULT_DRIVE_DB,
    DEFAULT_ENV_TO_DRIVE_DB, DEFAULT_GATE_COMP, DEFAULT_MIX, DEFAULT_OUTPUT_TRIM_DB,
    DEFAULT_POST_AIR_DB, DEFAULT_PRE_TILT,
};
use crate::dsp::DustPress;
use nih_plug::prelude::*;
use std::sync::Arc;

const DEFAULT_SAMPLE_RATE: f32 = 44100.0;

// Helper to format values as "50%" for the DAW display
fn format_percent(v: f32) -> String {
    format!("{:.0}%", v * 100.0)
}

// Helper to format gain in dB
fn format_db(v: f32) -> String {
    format!("{:.1} dB", v)
}

#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveParam {
    #[name = "Tanh"]
    Tanh,
    #[name = "Cubic"]
    Cubic,
    #[name = "Diode"]
    Diode,
    #[name = "Fold"]
    Fold,
}

impl CurveParam {
    fn index(self) -> u8 {
        match self {
            CurveParam::Tanh => 0,
            CurveParam::Cubic => 1,
            CurveParam::Diode => 2,
            CurveParam::Fold => 3,
        }
    }
}

// -----------------------------------------------------------------------------
// PARAMETERS
// -----------------------------------------------------------------------------
// Ranges are enforced here; the engine trusts whatever it is given.
#[derive(Params)]
pub struct DustPressParams {
    #[id = "drive"]
    pub drive: FloatParam,
    #[id = "bias"]
    pub bias: FloatParam,
    #[id = "curve"]
    pub curve: EnumParam<CurveParam>,
    #[id = "chaos"]
    pub chaos: FloatParam,
    #[id = "env_to_drive"]
    pub env_to_drive: FloatParam,
    #[id = "gate_comp"]
    pub gate_comp: FloatParam,
    #[id = "pre_tilt"]
    pub pre_tilt: FloatParam,
    #[id = "post_air"]
    pub post_air: FloatParam,
    #[id = "dirt"]
    pub dirt: FloatParam,
    #[id = "ceiling"]
    pub ceiling: FloatParam,
    #[id = "output_trim"]
    pub output_trim: FloatParam,
    #[id = "mix"]
    pub mix: FloatParam,
}

impl Default for DustPressParams {
    fn default() -> Self {
        Self {
            drive: FloatParam::new(
                "Drive",
                DEFAULT_DRIVE_DB,
                FloatRange::Linear {
                    min: 0.0,
                    max: 36.0,
                },
            )
            .with_step_size(0.1)
            .with_value_to_string(Arc::new(format_db)),
            bias: FloatParam::new(
                "Bias",
                DEFAULT_BIAS,
                FloatRange::Linear {
                    min: -1.0,
                    max: 1.0,
                },
            )
            .with_step_size(0.01),
            curve: EnumParam::new("Curve", CurveParam::Tanh),
            chaos: FloatParam::new(
                "Chaos",
                DEFAULT_CHAOS,
                FloatRange::Linear { min: 0.0, max: 7.0 },
            )
            .with_step_size(0.01),
            env_to_drive: FloatParam::new(
                "Env > Drive",
                DEFAULT_ENV_TO_DRIVE_DB,
                FloatRange::Linear {
                    min: -12.0,
                    max: 12.0,
                },
            )
            .with_step_size(0.1)
            .with_value_to_string(Arc::new(format_db)),
            gate_comp: FloatParam::new(
                "Gate/Comp",
                DEFAULT_GATE_COMP,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_value_to_string(Arc::new(format_percent)),
            pre_tilt: FloatParam::new(
                "Tilt",
                DEFAULT_PRE_TILT,
                FloatRange::Linear {
                    min: -6.0,
                    max: 6.0,
                },
            )
            .with_step_size(0.1)
            .with_unit(" dB/oct"),
            post_air: FloatParam::new(
                "Air",
                DEFAULT_POST_AIR_DB,
                FloatRange::Linear {
                    min: -6.0,
                    max: 6.0,
                },
            )
            .with_step_size(0.1)
            .with_value_to_string(Arc::new(format_db)),
            dirt: FloatParam::new(
                "Dirt",
                DEFAULT_DIRT,
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_value_to_string(Arc::new(format_percent)),
            ceiling: FloatParam::new(
                "Ceiling",
                DEFAULT_CEILING_DB,
                FloatRange::Linear {
                    min: -6.0,
                    max: 0.0,
                },
            )
            .with_step_size(0.1)
            .with_value_to_string(Arc::new(format_db)),
            output_trim: FloatParam::new(
                "Output",
                DEFAULT_OUTPUT_TRIM_DB,
                FloatRange::Linear {
                    min: -12.0,
                    max: 6.0,
                },
            )
            .with_step_size(0.1)
            .with_value_to_string(Arc::new(format_db)),
            mix: FloatParam::new("Mix", DEFAULT_MIX, FloatRange::Linear { min: 0.0, max: 1.0 })
                .with_value_to_string(Arc::new(format_percent)),
        }
    }
}

// -----------------------------------------------------------------------------
// PLUGIN STRUCT
// -----------------------------------------------------------------------------
struct DustPressPlugin {
    params: Arc<DustPressParams>,
    engine: DustPress,
    last_revision: u64,
}

impl Default for DustPressPlugin {
    fn default() -> Self {
        Self {
            params: Arc::new(DustPressParams::default()),
            engine: DustPress::new(DEFAULT_SAMPLE_RATE),
            last_revision: 0,
        }
    }
}

impl DustPressPlugin {
    /// Push the current parameter values into the engine. Unchanged values
    /// are skipped by the engine setters.
    fn apply_params(&mut self) {
        let p = &self.params;
        self.engine.set_drive_db(p.drive.value());
        self.engine.set_bias(p.bias.value());
        self.engine.set_curve_index(p.curve.value().index());
        self.engine.set_chaos(p.chaos.value());
        self.engine.set_env_to_drive_db(p.env_to_drive.value());
        self.engine.set_gate_comp(p.gate_comp.value());
        self.engine.set_pre_tilt(p.pre_tilt.value());
        self.engine.set_post_air(p.post_air.value());
        self.engine.set_dirt(p.dirt.value());
        self.engine.set_ceiling_db(p.ceiling.value());
        self.engine.set_output_trim_db(p.output_trim.value());
        self.engine.set_mix(p.mix.value());
    }

    fn process_internal(&mut self, buffer: &mut Buffer) -> ProcessStatus {
        self.apply_params();

        let revision = self.engine.coefficient_revision();
        if revision != self.last_revision {
            crate::dp_log!("[dustpress] controls changed (revision {})", revision);
            self.last_revision = revision;
        }

        if let [left, right, ..] = buffer.as_slice() {
            self.engine.process_block_in_place(left, right);
        }

        ProcessStatus::Normal
    }
}

impl Plugin for DustPressPlugin {
    const NAME: &'static str = "DustPress";
    const VENDOR: &'static str = "DustPress";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[AudioIOLayout {
        main_input_channels: NonZeroU32::new(2),
        main_output_channels: NonZeroU32::new(2),
        ..AudioIOLayout::const_default()
    }];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    fn initialize(
        &mut self,
        _audio_io_layout: &AudioIOLayout,
        buffer_config: &BufferConfig,
        context: &mut impl InitContext<Self>,
    ) -> bool {
        #[cfg(feature = "debug")]
        crate::debug::logger::init_logger();

        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.engine.set_sample_rate(buffer_config.sample_rate);
            self.apply_params();
            self.engine.reset();
            self.last_revision = self.engine.coefficient_revision();

            let latency = self.engine.latency_samples();
            context.set_latency_samples(latency as u32);
            log::info!(
                "DustPress initialized: {} Hz, max block {}, latency {} samples",
                buffer_config.sample_rate,
                buffer_config.max_buffer_size,
                latency
            );
            crate::dp_log!(
                "[dustpress] initialize sr={} latency={}",
                buffer_config.sample_rate,
                latency
            );

            #[cfg(feature = "debug")]
            crate::debug::logger::drain_to_file();

            true
        }))
        .unwrap_or(false)
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.process_internal(buffer)))
            .unwrap_or(ProcessStatus::Normal)
    }

    fn reset(&mut self) {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.engine.reset();
        }))
        .unwrap_or(());
    }
}

impl ClapPlugin for DustPressPlugin {
    const CLAP_ID: &'static str = "com.dustpress.saturator";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("Envelope-driven saturation with lookahead limiting");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Distortion,
        ClapFeature::Stereo,
    ];
}

impl Vst3Plugin for DustPressPlugin {
    const VST3_CLASS_ID: [u8; 16] = *b"DustPressSatFx01";
    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Distortion];
}

nih_export_clap!(DustPressPlugin);
nih_export_vst3!(DustPressPlugin);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_param_maps_to_engine_index() {
        assert_eq!(CurveParam::Tanh.index(), 0);
        assert_eq!(CurveParam::Fold.index(), 3);
    }

    #[test]
    fn test_default_params_match_engine_defaults() {
        let mut plugin = DustPressPlugin::default();
        let revision = plugin.engine.coefficient_revision();
        plugin.apply_params();
        assert_eq!(plugin.engine.coefficient_revision(), revision);
    }
}
