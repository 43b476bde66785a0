//! Whole-program analysis: function metrics, class table construction, type
//! inference, control-flow graphs, and liveness.
//!
//! The analyzer traverses the AST once and records per-function facts the
//! later phases consult (call-site counts, leaf status, trivial accessors,
//! return types). The class table fixes object layout and vtable slots with
//! single-inheritance semantics. CFG + liveness derive the per-block data
//! the register manager needs, in particular `vars_used_across_calls`, which
//! biases callee-saved allocation.

pub mod cfg;
pub mod classes;
pub mod infer;
pub mod liveness;
pub mod metrics;

pub use cfg::{BasicBlock, Cfg};
pub use classes::{ClassInfo, ClassTable, ClassTableError, MemberInfo, MethodInfo};
pub use infer::infer_expr_type;
pub use liveness::{BlockLiveness, LivenessAnalysis};
pub use metrics::{Analyzer, AnalysisInfo, FunctionMetrics, TrivialAccessor};
