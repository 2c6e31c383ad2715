//! Low-level FFI bindings to the RKLLM runtime C API
//!
//! This module provides unsafe bindings to librkllmrt.
//! All struct layouts and function signatures match the C API exactly.

use std::os::raw::{c_char, c_float, c_int, c_void};

/// Opaque engine handle (`LLMHandle` in the C API)
pub type RkllmHandle = *mut c_void;

/// Input modes accepted by `rkllm_run`
pub const RKLLM_INPUT_PROMPT: c_int = 0;
pub const RKLLM_INPUT_TOKEN: c_int = 1;
pub const RKLLM_INPUT_EMBED: c_int = 2;
pub const RKLLM_INPUT_MULTIMODAL: c_int = 3;

/// Callback states delivered to the result callback
pub const RKLLM_RUN_NORMAL: c_int = 0;
pub const RKLLM_RUN_WAITING: c_int = 1;
pub const RKLLM_RUN_FINISH: c_int = 2;
pub const RKLLM_RUN_ERROR: c_int = 3;

/// Inference modes for `RkllmInferParam`
pub const RKLLM_INFER_GENERATE: c_int = 0;

/// Extended parameters (matches RKLLMExtendParam in C)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RkllmExtendParam {
    pub base_domain_id: i32,
    pub embed_flash: i8,
    pub enabled_cpus_num: i8,
    pub enabled_cpus_mask: u32,
    pub reserved: [u8; 106],
}

impl Default for RkllmExtendParam {
    fn default() -> Self {
        Self {
            base_domain_id: 0,
            embed_flash: 0,
            enabled_cpus_num: 0,
            enabled_cpus_mask: 0,
            reserved: [0u8; 106],
        }
    }
}

/// Engine parameters (matches RKLLMParam in C)
///
/// The authoritative defaults come from `rkllm_createDefaultParam()` at
/// runtime; this `Default` impl mirrors the documented values and exists for
/// tests and struct initialization.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RkllmParam {
    pub model_path: *const c_char,
    pub max_context_len: i32,
    pub max_new_tokens: i32,
    pub top_k: i32,
    pub n_keep: i32,
    pub top_p: c_float,
    pub temperature: c_float,
    pub repeat_penalty: c_float,
    pub frequency_penalty: c_float,
    pub presence_penalty: c_float,
    pub mirostat: i32,
    pub mirostat_tau: c_float,
    pub mirostat_eta: c_float,
    pub skip_special_token: bool,
    pub is_async: bool,
    pub extend_param: RkllmExtendParam,
}

impl Default for RkllmParam {
    fn default() -> Self {
        Self {
            model_path: std::ptr::null(),
            max_context_len: 2048,
            max_new_tokens: -1,
            top_k: 40,
            n_keep: -1,
            top_p: 0.9,
            temperature: 0.8,
            repeat_penalty: 1.1,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            mirostat: 0,
            mirostat_tau: 5.0,
            mirostat_eta: 0.1,
            skip_special_token: false,
            is_async: false,
            extend_param: RkllmExtendParam::default(),
        }
    }
}

/// Token-sequence input (matches RKLLMTokenInput in C)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RkllmTokenInput {
    pub input_ids: *const i32,
    pub n_tokens: usize,
}

/// Payload of a tagged input
#[repr(C)]
#[derive(Clone, Copy)]
pub union RkllmInputPayload {
    pub prompt_input: *const c_char,
    pub token_input: RkllmTokenInput,
}

/// Tagged input record passed to `rkllm_run` (matches RKLLMInput in C)
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RkllmInput {
    pub input_type: c_int,
    pub payload: RkllmInputPayload,
}

/// Per-run inference parameters (matches RKLLMInferParam in C)
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RkllmInferParam {
    pub mode: c_int,
    pub lora_params: *const c_void,
    pub prompt_cache_params: *const c_void,
    pub keep_history: c_int,
}

impl Default for RkllmInferParam {
    fn default() -> Self {
        Self {
            mode: RKLLM_INFER_GENERATE,
            lora_params: std::ptr::null(),
            prompt_cache_params: std::ptr::null(),
            keep_history: 0,
        }
    }
}

/// One result delivery (matches RKLLMResult in C)
///
/// `text` may be null for non-token states (e.g. WAITING).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RkllmResult {
    pub text: *const c_char,
    pub token_id: i32,
}

/// The result callback registered once at init time.
///
/// Invoked by the engine on one of its own worker threads, zero or more
/// times per run with a non-terminal state, then exactly once with
/// `RKLLM_RUN_FINISH` or `RKLLM_RUN_ERROR`.
pub type RkllmResultCallback =
    unsafe extern "C" fn(result: *mut RkllmResult, userdata: *mut c_void, state: c_int);

/// FFI function signatures for librkllmrt
/// These are loaded dynamically from the runtime shared library.
pub struct RkllmFunctions {
    pub rkllm_create_default_param: unsafe extern "C" fn() -> RkllmParam,

    pub rkllm_init: unsafe extern "C" fn(
        handle: *mut RkllmHandle,
        param: *mut RkllmParam,
        callback: RkllmResultCallback,
    ) -> c_int,

    pub rkllm_run: unsafe extern "C" fn(
        handle: RkllmHandle,
        input: *mut RkllmInput,
        infer_params: *mut RkllmInferParam,
        userdata: *mut c_void,
    ) -> c_int,

    pub rkllm_abort: unsafe extern "C" fn(handle: RkllmHandle) -> c_int,

    // Returns 0 while a task is active, non-zero otherwise.
    pub rkllm_is_running: unsafe extern "C" fn(handle: RkllmHandle) -> c_int,

    pub rkllm_destroy: unsafe extern "C" fn(handle: RkllmHandle) -> c_int,
}
