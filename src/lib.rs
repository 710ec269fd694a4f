pub mod api;
pub mod diag;
pub mod error;
pub mod lexer;
pub mod metadata;
pub mod options;
pub mod parser;
pub mod serialization;
pub mod utils;
pub mod value;
pub mod writer;

pub use api::{load, load_file, save, save_to_string, try_load};
pub use diag::{Diag, DiagCode, DiagContext, Halt, Severity, TextPosition, TextSpan};
pub use error::{LoadError, MetadataError, SaveError, SdataError};
pub use metadata::{
    AtomType, ClassId, ClassRef, CollectionType, EnumId, FullName, LoadHook, ProgramMetadata,
    ProgramMetadataBuilder, PropertyAccessor, PropertyMetadata, TypeKind, TypeMetadata,
};
pub use options::SaveOptions;
pub use parser::{Loader, LoaderPool, MAX_NESTING_DEPTH};
pub use serialization::{to_value, ExportValue};
pub use value::{Atom, DataObject, Value};
