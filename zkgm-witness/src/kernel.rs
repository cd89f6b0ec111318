//! Host for circom-generated WebAssembly witness calculators.
//!
//! The kernel exchanges field elements through a small shared buffer of
//! 32-bit words (least significant word first) and reports failures through
//! the `runtime` imports. A fault code set by `exceptionHandler` aborts the
//! current export call and is surfaced as [`WitnessError::Kernel`] together
//! with any text the kernel printed through `printErrorMessage`.

use std::path::Path;

use num_bigint::BigUint;
use serde_json::Value;
use tracing::{debug, info};
use wasmer::{
    imports, Function, FunctionEnv, FunctionEnvMut, Instance, Module, RuntimeError, Store,
    TypedFunction,
};

use crate::{
    error::{KernelFault, Result, WitnessError},
    inputs::WitnessInput,
    signals::{from_words, normalize, signal_hash, to_words, SignalInputs},
    wtns::WitnessVector,
};

/// Lifecycle of a witness computation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelState {
    /// No circuit binary loaded.
    Uninitialized,
    /// Binary compiled and its prime and witness size read.
    Loaded,
    /// `init` called, inputs being written.
    Ready,
    /// All inputs accepted, witness being read out.
    Computing,
    /// Last computation produced a witness; the kernel can run again.
    WitnessAvailable,
    /// A fault or trap left the instance unusable; reload it.
    Failed,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct KernelOptions {
    /// Ask the kernel to evaluate circuit assertions while computing.
    pub sanity_check: bool,
}

#[derive(Default)]
struct RuntimeEnv {
    get_message_char: Option<TypedFunction<(), i32>>,
    read_shared: Option<TypedFunction<i32, i32>>,
    n32: u32,
    fault: Option<u32>,
    errors: String,
    buffer: String,
}

impl RuntimeEnv {
    fn reset(&mut self) {
        self.fault = None;
        self.errors.clear();
        self.buffer.clear();
    }
}

fn read_message(env: &mut FunctionEnvMut<RuntimeEnv>) -> std::result::Result<String, RuntimeError> {
    let next = env
        .data()
        .get_message_char
        .clone()
        .ok_or_else(|| RuntimeError::new("getMessageChar is not bound"))?;
    let mut message = String::new();
    loop {
        let c = next.call(env)?;
        if c == 0 {
            break;
        }
        message.push(char::from(c as u8));
    }
    Ok(message)
}

fn exception_handler(
    mut env: FunctionEnvMut<RuntimeEnv>,
    code: i32,
) -> std::result::Result<(), RuntimeError> {
    env.data_mut().fault = Some(code as u32);
    Err(RuntimeError::new(format!(
        "kernel raised {}",
        KernelFault::from_code(code as u32)
    )))
}

fn print_error_message(mut env: FunctionEnvMut<RuntimeEnv>) -> std::result::Result<(), RuntimeError> {
    let message = read_message(&mut env)?;
    let errors = &mut env.data_mut().errors;
    errors.push_str(&message);
    errors.push('\n');
    Ok(())
}

fn write_buffer_message(mut env: FunctionEnvMut<RuntimeEnv>) -> std::result::Result<(), RuntimeError> {
    let message = read_message(&mut env)?;
    let data = env.data_mut();
    if message == "\n" {
        debug!(target: "zkgm_witness::kernel", "{}", data.buffer);
        data.buffer.clear();
    } else {
        if !data.buffer.is_empty() {
            data.buffer.push(' ');
        }
        data.buffer.push_str(&message);
    }
    Ok(())
}

fn show_shared_rw_memory(mut env: FunctionEnvMut<RuntimeEnv>) -> std::result::Result<(), RuntimeError> {
    let n32 = env.data().n32;
    let read = env
        .data()
        .read_shared
        .clone()
        .ok_or_else(|| RuntimeError::new("readSharedRWMemory is not bound"))?;
    let mut words = Vec::with_capacity(n32 as usize);
    for j in 0..n32 {
        words.push(read.call(&mut env, j as i32)? as u32);
    }
    let data = env.data_mut();
    if !data.buffer.is_empty() {
        data.buffer.push(' ');
    }
    data.buffer.push_str(&from_words(&words).to_string());
    Ok(())
}

struct Exports {
    get_version: TypedFunction<(), i32>,
    get_field_num_len32: TypedFunction<(), i32>,
    get_raw_prime: TypedFunction<(), ()>,
    read_shared_rw_memory: TypedFunction<i32, i32>,
    write_shared_rw_memory: TypedFunction<(i32, i32), ()>,
    get_witness_size: TypedFunction<(), i32>,
    init: TypedFunction<i32, ()>,
    set_input_signal: TypedFunction<(i32, i32, i32), ()>,
    get_input_size: TypedFunction<(), i32>,
    get_witness: TypedFunction<i32, ()>,
    get_message_char: TypedFunction<(), i32>,
}

impl Exports {
    fn bind(instance: &Instance, store: &Store) -> Result<Self> {
        macro_rules! export {
            ($name:literal) => {
                instance
                    .exports
                    .get_typed_function(store, $name)
                    .map_err(|e| WitnessError::MissingExport(format!("{}: {}", $name, e)))?
            };
        }
        Ok(Self {
            get_version: export!("getVersion"),
            get_field_num_len32: export!("getFieldNumLen32"),
            get_raw_prime: export!("getRawPrime"),
            read_shared_rw_memory: export!("readSharedRWMemory"),
            write_shared_rw_memory: export!("writeSharedRWMemory"),
            get_witness_size: export!("getWitnessSize"),
            init: export!("init"),
            set_input_signal: export!("setInputSignal"),
            get_input_size: export!("getInputSize"),
            get_witness: export!("getWitness"),
            get_message_char: export!("getMessageChar"),
        })
    }
}

/// A loaded witness calculator.
pub struct Kernel {
    store: Store,
    env: FunctionEnv<RuntimeEnv>,
    _instance: Instance,
    exports: Exports,
    version: u32,
    n32: u32,
    prime: BigUint,
    witness_size: u32,
    options: KernelOptions,
    state: KernelState,
}

impl Kernel {
    /// Compile a circuit binary (WASM, or WAT text) and read its field
    /// parameters.
    pub fn load(bytes: &[u8], options: KernelOptions) -> Result<Self> {
        let mut store = Store::default();
        let module = Module::new(&store, bytes).map_err(|e| WitnessError::Compile(e.to_string()))?;

        let env = FunctionEnv::new(&mut store, RuntimeEnv::default());
        let import_object = imports! {
            "runtime" => {
                "exceptionHandler" => Function::new_typed_with_env(&mut store, &env, exception_handler),
                "printErrorMessage" => Function::new_typed_with_env(&mut store, &env, print_error_message),
                "writeBufferMessage" => Function::new_typed_with_env(&mut store, &env, write_buffer_message),
                "showSharedRWMemory" => Function::new_typed_with_env(&mut store, &env, show_shared_rw_memory),
            }
        };
        let instance = Instance::new(&mut store, &module, &import_object)
            .map_err(|e| WitnessError::Instantiate(e.to_string()))?;
        let exports = Exports::bind(&instance, &store)?;

        {
            let runtime = env.as_mut(&mut store);
            runtime.get_message_char = Some(exports.get_message_char.clone());
            runtime.read_shared = Some(exports.read_shared_rw_memory.clone());
        }

        let mut kernel = Self {
            store,
            env,
            _instance: instance,
            exports,
            version: 0,
            n32: 0,
            prime: BigUint::default(),
            witness_size: 0,
            options,
            state: KernelState::Uninitialized,
        };
        kernel.read_parameters()?;
        kernel.state = KernelState::Loaded;

        info!(
            version = kernel.version,
            n32 = kernel.n32,
            witness_size = kernel.witness_size,
            "loaded witness kernel"
        );
        Ok(kernel)
    }

    pub fn load_file(path: impl AsRef<Path>, options: KernelOptions) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::load(&bytes, options)
    }

    fn read_parameters(&mut self) -> Result<()> {
        let version = self.exports.get_version.call(&mut self.store);
        self.version = self.guard(version)? as u32;

        let n32 = self.exports.get_field_num_len32.call(&mut self.store);
        self.n32 = self.guard(n32)? as u32;
        if self.n32 == 0 {
            return Err(WitnessError::InvalidWitness(
                "kernel reports a zero field width".into(),
            ));
        }
        self.env.as_mut(&mut self.store).n32 = self.n32;

        let raw_prime = self.exports.get_raw_prime.call(&mut self.store);
        self.guard(raw_prime)?;
        self.prime = self.read_shared()?;

        let witness_size = self.exports.get_witness_size.call(&mut self.store);
        self.witness_size = self.guard(witness_size)? as u32;
        Ok(())
    }

    pub fn state(&self) -> KernelState {
        self.state
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Field width in 32-bit words.
    pub fn n32(&self) -> u32 {
        self.n32
    }

    pub fn prime(&self) -> &BigUint {
        &self.prime
    }

    pub fn witness_size(&self) -> u32 {
        self.witness_size
    }

    pub fn options(&self) -> KernelOptions {
        self.options
    }

    /// Number of input elements the circuit declares.
    pub fn input_size(&mut self) -> Result<u32> {
        let size = self.exports.get_input_size.call(&mut self.store);
        Ok(self.guard(size)? as u32)
    }

    pub fn compute_witness(&mut self, input: &WitnessInput) -> Result<WitnessVector> {
        self.compute_signals(&input.to_signals())
    }

    /// Raw input map as produced by circuit tooling: names to numbers,
    /// decimal strings or nested arrays.
    pub fn compute_witness_json(&mut self, input: &Value) -> Result<WitnessVector> {
        let signals = SignalInputs::from_json(input)?;
        self.compute_signals(&signals)
    }

    pub fn compute_signals(&mut self, signals: &SignalInputs) -> Result<WitnessVector> {
        match self.state {
            KernelState::Loaded | KernelState::WitnessAvailable => {}
            state => {
                return Err(WitnessError::InvalidState {
                    state,
                    operation: "compute a witness",
                })
            }
        }

        match self.run(signals) {
            Ok(witness) => {
                self.state = KernelState::WitnessAvailable;
                Ok(witness)
            }
            Err(err) => {
                self.state = KernelState::Failed;
                Err(err)
            }
        }
    }

    fn run(&mut self, signals: &SignalInputs) -> Result<WitnessVector> {
        self.env.as_mut(&mut self.store).reset();

        let init = self
            .exports
            .init
            .call(&mut self.store, i32::from(self.options.sanity_check));
        self.guard(init)?;
        self.state = KernelState::Ready;

        let mut set = 0u32;
        for (name, value) in signals.iter() {
            let (msb, lsb) = signal_hash(name);
            for (position, element) in value.flatten().into_iter().enumerate() {
                let reduced = normalize(element, &self.prime);
                self.write_shared(&reduced)?;
                let result = self.exports.set_input_signal.call(
                    &mut self.store,
                    msb as i32,
                    lsb as i32,
                    position as i32,
                );
                self.guard(result)?;
                set += 1;
            }
        }

        let required = self.input_size()?;
        if set < required {
            return Err(WitnessError::IncompleteInputs { set, required });
        }
        debug!(set, required, "all inputs set");

        self.state = KernelState::Computing;
        let mut values = Vec::with_capacity(self.witness_size as usize);
        for i in 0..self.witness_size {
            let result = self.exports.get_witness.call(&mut self.store, i as i32);
            self.guard(result)?;
            values.push(self.read_shared()?);
        }

        WitnessVector::new(self.prime.clone(), self.n32 * 4, values)
    }

    fn write_shared(&mut self, value: &BigUint) -> Result<()> {
        for (j, word) in to_words(value, self.n32 as usize).into_iter().enumerate() {
            let result =
                self.exports
                    .write_shared_rw_memory
                    .call(&mut self.store, j as i32, word as i32);
            self.guard(result)?;
        }
        Ok(())
    }

    fn read_shared(&mut self) -> Result<BigUint> {
        let mut words = Vec::with_capacity(self.n32 as usize);
        for j in 0..self.n32 {
            let word = self
                .exports
                .read_shared_rw_memory
                .call(&mut self.store, j as i32);
            words.push(self.guard(word)? as u32);
        }
        Ok(from_words(&words))
    }

    /// Turn a trap into a fault if the kernel reported one before trapping.
    fn guard<T>(&mut self, result: std::result::Result<T, RuntimeError>) -> Result<T> {
        result.map_err(|err| {
            let runtime = self.env.as_mut(&mut self.store);
            match runtime.fault.take() {
                Some(code) => WitnessError::Kernel {
                    fault: KernelFault::from_code(code),
                    diagnostics: runtime.errors.trim_end().to_string(),
                },
                None => WitnessError::Trap(err.message()),
            }
        })
    }
}

/// Owns at most one kernel and tracks the lifecycle from before loading.
#[derive(Default)]
pub struct WitnessEngine {
    options: KernelOptions,
    kernel: Option<Kernel>,
}

impl WitnessEngine {
    pub fn new(options: KernelOptions) -> Self {
        Self {
            options,
            kernel: None,
        }
    }

    pub fn state(&self) -> KernelState {
        self.kernel
            .as_ref()
            .map(Kernel::state)
            .unwrap_or(KernelState::Uninitialized)
    }

    /// Load (or reload) a circuit binary, replacing any previous kernel.
    pub fn load(&mut self, bytes: &[u8]) -> Result<&mut Kernel> {
        self.kernel = None;
        let kernel = Kernel::load(bytes, self.options)?;
        Ok(self.kernel.insert(kernel))
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<&mut Kernel> {
        let bytes = std::fs::read(path.as_ref())?;
        self.load(&bytes)
    }

    pub fn kernel(&mut self) -> Result<&mut Kernel> {
        self.kernel.as_mut().ok_or(WitnessError::NotLoaded)
    }

    pub fn compute_witness(&mut self, input: &WitnessInput) -> Result<WitnessVector> {
        self.kernel()?.compute_witness(input)
    }
}
