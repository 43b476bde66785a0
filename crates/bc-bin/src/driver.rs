//! Pipeline orchestration: AST in, callable entry pointer out.
//!
//! The driver owns no domain logic. It wires the phases in order — runtime
//! registration, AST passes, code generation, peephole, linking, JIT
//! commit — handing each phase's owned output to the next. The writable
//! data segment (globals, statics) lives in a separate pinned allocation so
//! the executable pages can stay R/X.

use anyhow::{Context, Result, bail};
use core_ast::Program;
use core_codegen::CodeGenerator;
use core_encoder::InstructionStream;
use core_jit::JitMemoryManager;
use core_link::{Linker, format_listing};
use core_passes::{PipelineOptions, run_pipeline};
use core_peephole::PeepholeOptimizer;
use core_runtime::RuntimeManager;
use core_symbols::SymbolTable;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub peephole_passes: u32,
    pub trace_passes: bool,
    pub listing: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            peephole_passes: 5,
            trace_passes: false,
            listing: false,
        }
    }
}

/// A committed program. The entry pointer stays valid for the lifetime of
/// this value; dropping it unmaps the pages.
pub struct CompiledProgram {
    jit: JitMemoryManager,
    /// Pinned backing store for globals and statics.
    _data: Box<[u8]>,
    entry_offset: usize,
    pub code_size: usize,
    pub listing: Option<String>,
    pub peephole_applied: u64,
}

impl CompiledProgram {
    pub fn entry_address(&self) -> u64 {
        self.jit.base_address() + self.entry_offset as u64
    }

    /// Call the compiled `START` routine.
    ///
    /// # Safety
    /// The committed code follows AAPCS and the module linked without
    /// errors; calling it executes arbitrary generated machine code.
    #[cfg(target_arch = "aarch64")]
    pub unsafe fn run(&self) -> i64 {
        let entry = unsafe { self.jit.entry_at(self.entry_offset) };
        unsafe { entry() }
    }
}

pub fn compile(program: Program, options: &CompileOptions) -> Result<CompiledProgram> {
    // The registry is the single source of truth for runtime symbols; it
    // populates the symbol table before any pass looks at a name.
    let runtime = RuntimeManager::new();
    let mut symbols = SymbolTable::new();
    runtime
        .register_into(&mut symbols)
        .context("runtime registry initialization")?;

    let pipeline_out = run_pipeline(
        program,
        &mut symbols,
        PipelineOptions {
            trace_passes: options.trace_passes,
        },
    )
    .context("AST pass pipeline")?;

    let generator = CodeGenerator::new(
        &mut symbols,
        &pipeline_out.analysis,
        &pipeline_out.liveness,
        &runtime,
    );
    let module = generator
        .generate(&pipeline_out.program)
        .context("code generation")?;

    let mut stream = InstructionStream::new();
    stream.extend(module.code);
    let mut peephole = PeepholeOptimizer::new();
    peephole.optimize(&mut stream, options.peephole_passes);
    let peephole_applied = peephole.stats().optimizations_applied;
    let code = stream.into_instructions();

    // Size the JIT region from the record count: 4 bytes per emitted
    // record, 16 per veneer, rodata alignment slack.
    let record_estimate = code.len() + module.rodata.len();
    let size_estimate = record_estimate * 4 + module.externals.len() * 16 + 64;
    let mut jit = JitMemoryManager::allocate(size_estimate.max(64)).context("jit allocation")?;

    // Writable data segment, pinned for the program's lifetime.
    let data_len = module
        .data
        .iter()
        .filter(|r| !r.is_label_definition)
        .count()
        * 4;
    let data_block: Box<[u8]> = vec![0u8; data_len.max(8)].into_boxed_slice();
    let data_base = data_block.as_ptr() as u64;

    let linker = Linker::new(&runtime);
    let linked = linker
        .link_with_data(
            code,
            module.rodata,
            module.data,
            &module.externals,
            jit.base_address(),
            data_base,
        )
        .context("linking")?;

    let bytes = linked.bytes();
    if bytes.len() > jit.aligned_size() {
        bail!(
            "linked module ({} bytes) exceeds the JIT allocation ({} bytes)",
            bytes.len(),
            jit.aligned_size()
        );
    }
    jit.write(0, &bytes).context("writing code")?;

    let mut data_block = data_block;
    let data_image = linked.data_bytes();
    data_block[..data_image.len()].copy_from_slice(&data_image);

    // Commit: barrier, i-cache invalidation, isb, then R/W -> R/X.
    jit.make_executable().context("committing code")?;

    // Cache-coherence check: the first emitted word must read back intact.
    if bytes.len() >= 4 {
        let readback = jit.read(0, 4);
        if readback != bytes[..4] {
            bail!("instruction readback mismatch after commit");
        }
    }

    let entry = linked
        .address_of("START")
        .context("program has no START routine")?;
    let entry_offset = (entry - linked.base_address) as usize;

    let listing = options.listing.then(|| format_listing(&linked));
    info!(
        target: "driver",
        code_bytes = bytes.len(),
        data_bytes = data_image.len(),
        entry = entry,
        peephole_applied,
        "compile_complete"
    );
    debug!(target: "driver", labels = linked.labels.len(), "link_labels");

    Ok(CompiledProgram {
        jit,
        _data: data_block,
        entry_offset,
        code_size: bytes.len(),
        listing,
        peephole_applied,
    })
}
