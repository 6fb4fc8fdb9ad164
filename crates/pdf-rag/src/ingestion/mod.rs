//! Document ingestion: parse, chunk, embed and index uploaded files

mod chunker;
mod parser;
mod pipeline;

pub use chunker::TextChunker;
pub use parser::{FileParser, PageContent, ParsedDocument};
pub use pipeline::{
    prepare_upload_dir, sanitize_filename, IngestOutcome, IngestPipeline, PreparedUpload,
};

#[cfg(test)]
pub(crate) use parser::tests::pdf_with_pages;
