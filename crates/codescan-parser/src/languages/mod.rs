pub mod extractor_utils;
pub mod go;
pub mod java;
pub mod python;
pub mod typescript;

pub use go::GoParser;
pub use java::JavaParser;
pub use python::PythonParser;
pub use typescript::TypeScriptParser;
