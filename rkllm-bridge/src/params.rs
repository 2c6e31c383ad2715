//! Generation parameters and translation onto the native param record
//!
//! Every numeric field has a sentinel "unset" value. Unset fields leave the
//! engine's built-in defaults untouched; explicit values are forwarded
//! unchanged. This apply-only-if-set rule is the parameter-translation
//! contract and must not be loosened.

use crate::ffi::RkllmParam;
use serde::{Deserialize, Serialize};

/// Parameters consumed once at engine init time.
///
/// `<= 0` means unset for every numeric field except `mirostat`, which is a
/// signed mode selector where `< 0` means unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Maximum number of tokens to generate per run
    pub max_new_tokens: i32,

    /// Maximum context length
    pub max_context_len: i32,

    /// Top-k sampling threshold
    pub top_k: i32,

    /// Top-p (nucleus) sampling threshold
    pub top_p: f32,

    /// Sampling temperature
    pub temperature: f32,

    /// Repetition penalty
    pub repeat_penalty: f32,

    /// Frequency penalty
    pub frequency_penalty: f32,

    /// Presence penalty
    pub presence_penalty: f32,

    /// Mirostat mode (0 disabled, 1 or 2 for the algorithm version)
    pub mirostat: i32,

    /// Mirostat target entropy
    pub mirostat_tau: f32,

    /// Mirostat learning rate
    pub mirostat_eta: f32,

    /// Number of prompt tokens to keep when the context window slides
    pub n_keep: i32,

    /// Strip special tokens from the generated text
    pub skip_special_token: bool,

    /// Number of CPU cores to pin the engine to (0 = engine default)
    pub num_cpus: i32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: -1,
            max_context_len: -1,
            top_k: -1,
            top_p: 0.0,
            temperature: 0.0,
            repeat_penalty: 0.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            mirostat: -1,
            mirostat_tau: 0.0,
            mirostat_eta: 0.0,
            n_keep: -1,
            skip_special_token: true,
            num_cpus: 0,
        }
    }
}

impl GenerationParams {
    /// Pin the engine to every core the host reports
    pub fn with_detected_cpus(mut self) -> Self {
        self.num_cpus = num_cpus::get() as i32;
        self
    }

    /// Overlay explicitly-set fields onto a native param record.
    ///
    /// `param` should come from the engine's `rkllm_createDefaultParam()` so
    /// that unset fields keep the engine defaults. Also forces synchronous
    /// execution: the bridge supplies its own blocking discipline.
    pub fn apply_to(&self, param: &mut RkllmParam) {
        if self.max_new_tokens > 0 {
            param.max_new_tokens = self.max_new_tokens;
        }
        if self.max_context_len > 0 {
            param.max_context_len = self.max_context_len;
        }
        if self.top_k > 0 {
            param.top_k = self.top_k;
        }
        if self.top_p > 0.0 {
            param.top_p = self.top_p;
        }
        if self.temperature > 0.0 {
            param.temperature = self.temperature;
        }
        if self.repeat_penalty > 0.0 {
            param.repeat_penalty = self.repeat_penalty;
        }
        if self.frequency_penalty > 0.0 {
            param.frequency_penalty = self.frequency_penalty;
        }
        if self.presence_penalty > 0.0 {
            param.presence_penalty = self.presence_penalty;
        }
        if self.mirostat >= 0 {
            param.mirostat = self.mirostat;
        }
        if self.mirostat_tau > 0.0 {
            param.mirostat_tau = self.mirostat_tau;
        }
        if self.mirostat_eta > 0.0 {
            param.mirostat_eta = self.mirostat_eta;
        }
        if self.n_keep > 0 {
            param.n_keep = self.n_keep;
        }
        param.skip_special_token = self.skip_special_token;
        param.is_async = false;

        if self.num_cpus > 0 {
            param.extend_param.enabled_cpus_mask = cpu_affinity_mask(self.num_cpus);
            param.extend_param.enabled_cpus_num = self.num_cpus.min(i8::MAX as i32) as i8;
        }
    }
}

/// Affinity bitmask for the first `num_cpus` cores.
///
/// Non-positive counts produce an empty mask; 32 or more cores saturates
/// the 32-bit mask.
pub fn cpu_affinity_mask(num_cpus: i32) -> u32 {
    if num_cpus <= 0 {
        0
    } else if num_cpus >= 32 {
        0xFFFF_FFFF
    } else {
        (1u32 << num_cpus) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_fields_keep_engine_defaults() {
        let mut param = RkllmParam::default();
        let baseline = param;

        GenerationParams::default().apply_to(&mut param);

        assert_eq!(param.max_new_tokens, baseline.max_new_tokens);
        assert_eq!(param.max_context_len, baseline.max_context_len);
        assert_eq!(param.top_k, baseline.top_k);
        assert_eq!(param.top_p, baseline.top_p);
        assert_eq!(param.temperature, baseline.temperature);
        assert_eq!(param.repeat_penalty, baseline.repeat_penalty);
        assert_eq!(param.frequency_penalty, baseline.frequency_penalty);
        assert_eq!(param.presence_penalty, baseline.presence_penalty);
        assert_eq!(param.mirostat_tau, baseline.mirostat_tau);
        assert_eq!(param.mirostat_eta, baseline.mirostat_eta);
        assert_eq!(param.n_keep, baseline.n_keep);
        assert_eq!(param.extend_param.enabled_cpus_mask, 0);
    }

    #[test]
    fn test_explicit_values_forwarded_unchanged() {
        let mut param = RkllmParam::default();
        let params = GenerationParams {
            max_new_tokens: 64,
            max_context_len: 4096,
            top_k: 20,
            top_p: 0.85,
            temperature: 0.6,
            repeat_penalty: 1.3,
            frequency_penalty: 0.5,
            presence_penalty: 0.25,
            mirostat: 2,
            mirostat_tau: 4.0,
            mirostat_eta: 0.2,
            n_keep: 16,
            skip_special_token: false,
            num_cpus: 4,
        };

        params.apply_to(&mut param);

        assert_eq!(param.max_new_tokens, 64);
        assert_eq!(param.max_context_len, 4096);
        assert_eq!(param.top_k, 20);
        assert_eq!(param.top_p, 0.85);
        assert_eq!(param.temperature, 0.6);
        assert_eq!(param.repeat_penalty, 1.3);
        assert_eq!(param.frequency_penalty, 0.5);
        assert_eq!(param.presence_penalty, 0.25);
        assert_eq!(param.mirostat, 2);
        assert_eq!(param.mirostat_tau, 4.0);
        assert_eq!(param.mirostat_eta, 0.2);
        assert_eq!(param.n_keep, 16);
        assert!(!param.skip_special_token);
        assert_eq!(param.extend_param.enabled_cpus_num, 4);
    }

    #[test]
    fn test_mirostat_zero_is_an_explicit_value() {
        // 0 disables mirostat, which is a real setting, not "unset"
        let mut param = RkllmParam::default();
        param.mirostat = 2;

        let params = GenerationParams {
            mirostat: 0,
            ..Default::default()
        };
        params.apply_to(&mut param);

        assert_eq!(param.mirostat, 0);
    }

    #[test]
    fn test_sync_mode_always_forced() {
        let mut param = RkllmParam {
            is_async: true,
            ..Default::default()
        };
        GenerationParams::default().apply_to(&mut param);
        assert!(!param.is_async);
    }

    #[test]
    fn test_params_round_trip_through_json() {
        let params = GenerationParams {
            max_new_tokens: 128,
            temperature: 0.7,
            ..Default::default()
        };

        let json = serde_json::to_string(&params).unwrap();
        let restored: GenerationParams = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.max_new_tokens, 128);
        assert_eq!(restored.temperature, 0.7);
        assert_eq!(restored.mirostat, -1);
    }

    #[test]
    fn test_cpu_affinity_mask() {
        assert_eq!(cpu_affinity_mask(-3), 0);
        assert_eq!(cpu_affinity_mask(0), 0);
        assert_eq!(cpu_affinity_mask(1), 0b1);
        assert_eq!(cpu_affinity_mask(4), 0b1111);
        assert_eq!(cpu_affinity_mask(8), 0xFF);
        assert_eq!(cpu_affinity_mask(31), 0x7FFF_FFFF);
        assert_eq!(cpu_affinity_mask(32), 0xFFFF_FFFF);
        assert_eq!(cpu_affinity_mask(64), 0xFFFF_FFFF);
    }
}
