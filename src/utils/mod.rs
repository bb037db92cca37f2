pub mod function_call_assembler;

pub use function_call_assembler::FunctionCallAssembler;
