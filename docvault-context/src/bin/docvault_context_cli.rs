use clap::Parser;
use docvault_context::text::{ChunkParams, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, TextChunker};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::process;

/// A CLI tool to chunk text files into JSON output using docvault-context.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Source filename recorded on every segment.
    #[arg(short, long, default_value = "stdin")]
    filename: String,

    /// Window size in characters.
    #[arg(short, long, default_value_t = DEFAULT_CHUNK_SIZE)]
    size: usize,

    /// Characters shared by consecutive segments.
    #[arg(short, long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    overlap: usize,
}

#[derive(Serialize)]
struct SerializableSegment<'a> {
    source_filename: &'a str,
    chunk_index: usize,
    total_chunks: usize,
    char_start: usize,
    char_end: usize,
    text: &'a str,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let chunker = match TextChunker::new(ChunkParams::new(args.size, args.overlap)) {
        Ok(chunker) => chunker,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    };

    let file_content = if let Some(input_path) = args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let segments = chunker.chunk(&file_content);
    let total_chunks = segments.len();

    let serializable: Vec<SerializableSegment> = segments
        .iter()
        .map(|segment| SerializableSegment {
            source_filename: &args.filename,
            chunk_index: segment.sequence,
            total_chunks,
            char_start: segment.char_range.start,
            char_end: segment.char_range.end,
            text: &segment.text,
        })
        .collect();

    let json_output = serde_json::to_string_pretty(&serializable)?;
    println!("{json_output}");

    Ok(())
}
