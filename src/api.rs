use crate::diag::{DiagCode, DiagContext};
use crate::error::{LoadError, SaveError, SdataError};
use crate::metadata::{ClassId, ProgramMetadata};
use crate::options::SaveOptions;
use crate::parser::LoaderPool;
use crate::value::DataObject;
use crate::writer::Serializer;
use std::fmt;
use std::io::Read;
use std::path::Path;

static LOADERS: LoaderPool = LoaderPool::new();

/// Loads a document whose root object must be `root` or derive from it.
///
/// Every diagnostic is appended to `ctx`. Returns `None` when the document could
/// not be loaded, in which case `ctx` holds at least one error.
///
/// # Arguments
///
/// * `source_name` - The name used in diagnostic spans, usually a file path.
/// * `reader` - The document text, read to the end before parsing.
pub fn try_load<R: Read>(
    source_name: &str,
    reader: R,
    ctx: &mut DiagContext,
    program: &ProgramMetadata,
    root: ClassId,
) -> Option<DataObject> {
    log::debug!("Loading '{source_name}'");
    let mark = ctx.mark();
    let mut loader = LOADERS.get();
    let mut parser = match loader.begin(source_name, reader, program, ctx) {
        Ok(parser) => parser,
        Err(err) => {
            ctx.add_error(
                DiagCode::SourceReadFailed,
                format!("Failed to read '{source_name}': {err}"),
                None,
            );
            log::debug!("Failed to read '{source_name}': {err}");
            return None;
        }
    };
    let result = parser.parse_document(root).ok();
    log::debug!(
        "Loaded '{source_name}': {} ({} diagnostic(s))",
        if result.is_some() { "ok" } else { "failed" },
        ctx.since(mark).len()
    );
    result
}

/// Loads a document from a string.
///
/// # Errors
///
/// Returns a [`LoadError`] holding the diagnostics this load produced, renderable
/// against `text` through miette.
pub fn load(
    source_name: &str,
    text: &str,
    program: &ProgramMetadata,
    root: ClassId,
) -> Result<DataObject, LoadError> {
    let mut ctx = DiagContext::new();
    let mark = ctx.mark();
    match try_load(source_name, text.as_bytes(), &mut ctx, program, root) {
        Some(obj) => Ok(obj),
        None => Err(LoadError::new(source_name, text, ctx.since(mark).to_vec())),
    }
}

/// Loads the document at `path`.
///
/// # Errors
///
/// Returns [`SdataError::Io`] if the file cannot be read, or [`SdataError::Load`]
/// if it is not a valid document.
pub fn load_file(
    path: impl AsRef<Path>,
    program: &ProgramMetadata,
    root: ClassId,
) -> Result<DataObject, SdataError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| SdataError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(load(&path.display().to_string(), &text, program, root)?)
}

/// Writes `obj` as a document whose declared root type is `declared`.
///
/// The object's own class decides the written head, so any concrete class
/// deriving from `declared` may be saved.
///
/// # Errors
///
/// Returns a [`SaveError`] when the graph does not conform to the metadata, or
/// when `writer` fails.
pub fn save<W: fmt::Write>(
    obj: &DataObject,
    program: &ProgramMetadata,
    declared: ClassId,
    writer: &mut W,
    options: &SaveOptions,
) -> Result<(), SaveError> {
    log::debug!("Saving {}", program.class_name(declared));
    let text = Serializer::new(program, options).serialize(obj, declared)?;
    writer.write_str(&text)?;
    log::debug!("Saved {} bytes", text.len());
    Ok(())
}

/// [`save`] into a new string.
///
/// # Errors
///
/// Returns a [`SaveError`] when the graph does not conform to the metadata.
pub fn save_to_string(
    obj: &DataObject,
    program: &ProgramMetadata,
    declared: ClassId,
    options: &SaveOptions,
) -> Result<String, SaveError> {
    let mut out = String::new();
    save(obj, program, declared, &mut out, options)?;
    Ok(out)
}
