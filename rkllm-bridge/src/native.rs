//! Native engine backend over librkllmrt
//!
//! Owns the dynamically loaded runtime library, the engine handle, and the
//! one unsafe boundary of the crate: the callback trampoline that casts the
//! engine's raw userdata pointer back into a session reference. Nothing
//! outside this module touches a raw pointer.

use crate::engine::{EngineBackend, GenerationInput};
use crate::error::{BridgeError, Result};
use crate::ffi::{
    RkllmFunctions, RkllmHandle, RkllmInferParam, RkllmInput, RkllmInputPayload, RkllmResult,
    RkllmTokenInput, RKLLM_INPUT_PROMPT, RKLLM_INPUT_TOKEN, RKLLM_RUN_ERROR, RKLLM_RUN_FINISH,
    RKLLM_RUN_WAITING,
};
use crate::params::GenerationParams;
use crate::session::GenerationSession;
use libloading::Library;
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::os::raw::{c_int, c_void};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// librkllmrt supports a single engine instance per process.
static INSTANCE_LIVE: AtomicBool = AtomicBool::new(false);

/// Default runtime library name for the current platform
pub fn default_runtime_library() -> String {
    #[cfg(target_os = "windows")]
    return "rkllmrt.dll".to_string();
    #[cfg(target_os = "macos")]
    return "librkllmrt.dylib".to_string();
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    "librkllmrt.so".to_string()
}

/// Adapter-owned storage for one in-flight run.
///
/// The engine may keep reading the input record and its backing buffers
/// after `rkllm_run` returns the ack, so everything it points at lives here
/// until the run is provably over (next start, or shutdown). Boxed so the
/// pointers stay stable.
struct RunStorage {
    input: Box<RkllmInput>,
    infer: Box<RkllmInferParam>,
    _prompt: Option<CString>,
    _tokens: Option<Vec<i32>>,
}

/// The production `EngineBackend` over a loaded librkllmrt
pub struct NativeEngine {
    functions: RkllmFunctions,
    handle: RkllmHandle,
    // Raw Arc clone handed to the engine as callback userdata. Released only
    // once no further callback can fire, so a late delivery after abort
    // still finds a live session.
    userdata: Option<*const GenerationSession>,
    run_storage: Option<RunStorage>,
    _model_path: CString,
    _library: Library,
}

// The handle and userdata pointers are only dereferenced by the engine and
// the trampoline; moving the struct between threads is fine.
unsafe impl Send for NativeEngine {}

impl NativeEngine {
    /// Load the runtime library and initialize the engine with the given
    /// model and parameters.
    ///
    /// # Arguments
    /// * `library_path` - Path to librkllmrt.so (or platform equivalent)
    /// * `model_path` - Path to the .rkllm model file
    /// * `params` - Generation parameters; unset fields keep engine defaults
    pub fn load(library_path: &Path, model_path: &Path, params: &GenerationParams) -> Result<Self> {
        if INSTANCE_LIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BridgeError::AlreadyInitialized);
        }

        let engine = Self::load_inner(library_path, model_path, params);
        if engine.is_err() {
            INSTANCE_LIVE.store(false, Ordering::SeqCst);
        }
        engine
    }

    fn load_inner(
        library_path: &Path,
        model_path: &Path,
        params: &GenerationParams,
    ) -> Result<Self> {
        let library = unsafe {
            Library::new(library_path).map_err(|e| {
                BridgeError::LibraryLoad(format!("{}: {}", library_path.display(), e))
            })?
        };

        let functions = Self::load_functions(&library)?;

        let model_path_cstr = CString::new(model_path.to_string_lossy().as_bytes())
            .map_err(|e| BridgeError::InvalidInput(format!("Invalid model path: {}", e)))?;

        let mut param = unsafe { (functions.rkllm_create_default_param)() };
        param.model_path = model_path_cstr.as_ptr();
        params.apply_to(&mut param);

        let mut handle: RkllmHandle = std::ptr::null_mut();
        let ret = unsafe { (functions.rkllm_init)(&mut handle, &mut param, result_trampoline) };
        if ret != 0 {
            log::error!("rkllm_init failed with code {}", ret);
            return Err(BridgeError::InitFailed(ret));
        }

        log::info!("Initialized RKLLM engine with model {}", model_path.display());

        Ok(Self {
            functions,
            handle,
            userdata: None,
            run_storage: None,
            _model_path: model_path_cstr,
            _library: library,
        })
    }

    /// Load all required function symbols from the library
    fn load_functions(library: &Library) -> Result<RkllmFunctions> {
        unsafe {
            Ok(RkllmFunctions {
                rkllm_create_default_param: *library
                    .get(b"rkllm_createDefaultParam\0")
                    .map_err(|e| {
                        BridgeError::MissingSymbol(format!("rkllm_createDefaultParam: {}", e))
                    })?,

                rkllm_init: *library
                    .get(b"rkllm_init\0")
                    .map_err(|e| BridgeError::MissingSymbol(format!("rkllm_init: {}", e)))?,

                rkllm_run: *library
                    .get(b"rkllm_run\0")
                    .map_err(|e| BridgeError::MissingSymbol(format!("rkllm_run: {}", e)))?,

                rkllm_abort: *library
                    .get(b"rkllm_abort\0")
                    .map_err(|e| BridgeError::MissingSymbol(format!("rkllm_abort: {}", e)))?,

                rkllm_is_running: *library
                    .get(b"rkllm_is_running\0")
                    .map_err(|e| BridgeError::MissingSymbol(format!("rkllm_is_running: {}", e)))?,

                rkllm_destroy: *library
                    .get(b"rkllm_destroy\0")
                    .map_err(|e| BridgeError::MissingSymbol(format!("rkllm_destroy: {}", e)))?,
            })
        }
    }

    /// Release the raw session reference held for the engine's callbacks.
    ///
    /// Only safe once no further callback can fire: at the next `start` (the
    /// previous run has had its terminal event or was aborted with the engine
    /// acknowledging), or at shutdown.
    fn release_userdata(&mut self) {
        if let Some(raw) = self.userdata.take() {
            unsafe { drop(Arc::from_raw(raw)) };
        }
        self.run_storage = None;
    }
}

impl EngineBackend for NativeEngine {
    fn start(&mut self, input: &GenerationInput, session: &Arc<GenerationSession>) -> Result<()> {
        self.release_userdata();

        let storage = match input {
            GenerationInput::Prompt(text) => {
                let prompt = CString::new(text.as_str()).map_err(|e| {
                    BridgeError::InvalidInput(format!("Prompt contains NUL byte: {}", e))
                })?;
                let record = Box::new(RkllmInput {
                    input_type: RKLLM_INPUT_PROMPT,
                    payload: RkllmInputPayload {
                        prompt_input: prompt.as_ptr(),
                    },
                });
                log::debug!("Starting prompt run ({} bytes)", text.len());
                RunStorage {
                    input: record,
                    infer: Box::new(RkllmInferParam::default()),
                    _prompt: Some(prompt),
                    _tokens: None,
                }
            }
            GenerationInput::Tokens(tokens) => {
                // Owned copy: the engine reads the sequence asynchronously
                // after the ack.
                let owned = tokens.clone();
                let record = Box::new(RkllmInput {
                    input_type: RKLLM_INPUT_TOKEN,
                    payload: RkllmInputPayload {
                        token_input: RkllmTokenInput {
                            input_ids: owned.as_ptr(),
                            n_tokens: owned.len(),
                        },
                    },
                });
                log::debug!("Starting token run ({} tokens)", owned.len());
                RunStorage {
                    input: record,
                    infer: Box::new(RkllmInferParam::default()),
                    _prompt: None,
                    _tokens: Some(owned),
                }
            }
        };
        let storage = self.run_storage.insert(storage);

        let raw = Arc::into_raw(Arc::clone(session));
        let ret = unsafe {
            (self.functions.rkllm_run)(
                self.handle,
                &mut *storage.input as *mut RkllmInput,
                &mut *storage.infer as *mut RkllmInferParam,
                raw as *mut c_void,
            )
        };

        if ret != 0 {
            // The ack failed, so no callback will ever fire for this run;
            // reclaim the reference and the input storage now.
            unsafe { drop(Arc::from_raw(raw)) };
            self.run_storage = None;
            return Err(BridgeError::EngineRunFailure(ret));
        }

        self.userdata = Some(raw);
        Ok(())
    }

    fn abort(&mut self) -> Result<()> {
        // rkllm_abort returns only after the engine's run loop has stopped.
        let ret = unsafe { (self.functions.rkllm_abort)(self.handle) };
        if ret != 0 {
            return Err(BridgeError::AbortFailed(ret));
        }
        Ok(())
    }

    fn is_running(&mut self) -> Result<bool> {
        // librkllmrt reports 0 while a task is active.
        let ret = unsafe { (self.functions.rkllm_is_running)(self.handle) };
        Ok(ret == 0)
    }

    fn shutdown(&mut self) {
        if self.handle.is_null() {
            return;
        }
        let ret = unsafe { (self.functions.rkllm_destroy)(self.handle) };
        if ret != 0 {
            log::warn!("rkllm_destroy returned {}", ret);
        }
        self.handle = std::ptr::null_mut();
        self.release_userdata();
        INSTANCE_LIVE.store(false, Ordering::SeqCst);
        log::info!("RKLLM engine destroyed");
    }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The single callback registered with the engine at init time.
///
/// Runs on an engine-owned thread. Decodes the C arguments and forwards to
/// the session's dispatch methods; the session is borrowed through
/// `ManuallyDrop` so the reference count is untouched here.
unsafe extern "C" fn result_trampoline(
    result: *mut RkllmResult,
    userdata: *mut c_void,
    state: c_int,
) {
    if userdata.is_null() {
        return;
    }
    let session = ManuallyDrop::new(Arc::from_raw(userdata as *const GenerationSession));

    match state {
        RKLLM_RUN_FINISH => session.on_finish(),
        RKLLM_RUN_ERROR => session.on_error(),
        RKLLM_RUN_WAITING => {}
        _ => {
            if result.is_null() {
                return;
            }
            let text = (*result).text;
            if text.is_null() {
                return;
            }
            let text = CStr::from_ptr(text).to_string_lossy();
            if !text.is_empty() {
                session.on_token(&text);
            }
        }
    }
}
