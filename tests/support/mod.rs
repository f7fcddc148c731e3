// tests/support/mod.rs

#![allow(dead_code)]

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use negotiate_auth::gss::{BufferHandle, ContextHandle, Exchange, NameHandle, Status};
use negotiate_auth::{ContextFlags, GssApi, Oid};

pub const GSS_S_FAILURE: u32 = 13 << 16;

/// A security library stand-in.
///
/// Round `n` of a context outputs `round<n>` and completes at round
/// `complete_at`. An input token of `reject` fails the exchange.
#[derive(Debug)]
pub struct ScriptedGss {
    complete_at: u32,
    next_id: AtomicU64,
    exchanges: AtomicUsize,
    names: Mutex<HashMap<u64, String>>,
    contexts: Mutex<HashMap<u64, u32>>,
    buffers: Mutex<HashMap<u64, Vec<u8>>>,
    inputs: Mutex<Vec<Vec<u8>>>,
    calls: Mutex<Vec<(Oid, ContextFlags)>>,
    name_types: Mutex<Vec<Oid>>,
}

impl ScriptedGss {
    pub fn new(complete_at: u32) -> Arc<ScriptedGss> {
        Arc::new(ScriptedGss {
            complete_at,
            next_id: AtomicU64::new(1),
            exchanges: AtomicUsize::new(0),
            names: Mutex::new(HashMap::new()),
            contexts: Mutex::new(HashMap::new()),
            buffers: Mutex::new(HashMap::new()),
            inputs: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            name_types: Mutex::new(Vec::new()),
        })
    }

    fn id(&self) -> NonZeroU64 {
        NonZeroU64::new(self.next_id.fetch_add(1, Ordering::Relaxed)).unwrap()
    }

    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<Vec<u8>> {
        self.inputs.lock().unwrap().clone()
    }

    /// Mechanism and request flags of every exchange, in call order.
    pub fn calls(&self) -> Vec<(Oid, ContextFlags)> {
        self.calls.lock().unwrap().clone()
    }

    /// Name type of every imported name, in call order.
    pub fn name_types(&self) -> Vec<Oid> {
        self.name_types.lock().unwrap().clone()
    }

    pub fn imported_names(&self) -> Vec<String> {
        self.names.lock().unwrap().values().cloned().collect()
    }

    /// Names, contexts and buffers not yet released.
    pub fn live_handles(&self) -> usize {
        self.names.lock().unwrap().len()
            + self.contexts.lock().unwrap().len()
            + self.buffers.lock().unwrap().len()
    }

    pub fn live_contexts(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }

    fn output(&self, bytes: &[u8]) -> Option<BufferHandle> {
        let id = self.id();
        self.buffers.lock().unwrap().insert(id.get(), bytes.to_vec());
        Some(BufferHandle::from_raw(id))
    }
}

impl GssApi for ScriptedGss {
    fn import_name(&self, name: &str, name_type: &Oid) -> Result<NameHandle, Status> {
        self.name_types.lock().unwrap().push(*name_type);
        let id = self.id();
        self.names.lock().unwrap().insert(id.get(), name.to_owned());
        Ok(NameHandle::from_raw(id))
    }

    fn init_sec_context(
        &self,
        context: &mut Option<ContextHandle>,
        _target: &NameHandle,
        mech: &Oid,
        flags: ContextFlags,
        input: &[u8],
    ) -> Exchange {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push((*mech, flags));
        self.inputs.lock().unwrap().push(input.to_vec());

        let handle = context.get_or_insert_with(|| {
            let id = self.id();
            self.contexts.lock().unwrap().insert(id.get(), 0);
            ContextHandle::from_raw(id)
        });

        if input == b"reject" {
            return Exchange {
                status: Status::new(GSS_S_FAILURE, 0),
                output: None,
            };
        }

        let round = {
            let mut contexts = self.contexts.lock().unwrap();
            let round = contexts.entry(handle.as_raw().get()).or_insert(0);
            *round += 1;
            *round
        };

        let status = if round >= self.complete_at {
            Status::COMPLETE
        } else {
            Status::CONTINUE_NEEDED
        };

        Exchange {
            status,
            output: self.output(format!("round{round}").as_bytes()),
        }
    }

    fn read_buffer(&self, buffer: &BufferHandle) -> Vec<u8> {
        self.buffers
            .lock()
            .unwrap()
            .get(&buffer.as_raw().get())
            .cloned()
            .unwrap_or_default()
    }

    fn release_buffer(&self, buffer: BufferHandle) -> Status {
        self.buffers.lock().unwrap().remove(&buffer.as_raw().get());
        Status::COMPLETE
    }

    fn delete_sec_context(&self, context: ContextHandle) -> Status {
        self.contexts.lock().unwrap().remove(&context.as_raw().get());
        Status::COMPLETE
    }

    fn release_name(&self, name: NameHandle) -> Status {
        self.names.lock().unwrap().remove(&name.as_raw().get());
        Status::COMPLETE
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// base64 of `round<n>`.
pub fn round_token(n: u32) -> String {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.encode(format!("round{n}"))
}
