use anyhow::{Context, Result};
use geoipd::Database;
use serde_json::json;
use std::path::PathBuf;

use crate::cli_utils::{format_bytes, format_unix_timestamp};

pub fn cmd_inspect(database: PathBuf, json_output: bool) -> Result<()> {
    let db = Database::open(&database)
        .with_context(|| format!("Failed to load database: {}", database.display()))?;

    let metadata = db.metadata();
    let header = db.header();

    if json_output {
        let output = json!({
            "file": database.display().to_string(),
            "size": db.size(),
            "mmap": db.is_mmap(),
            "metadata": {
                "database_type": metadata.database_type,
                "ip_version": metadata.ip_version.number(),
                "record_size": metadata.record_size.bits(),
                "node_count": metadata.node_count,
                "binary_format_major_version": metadata.binary_format_major_version,
                "binary_format_minor_version": metadata.binary_format_minor_version,
                "build_epoch": metadata.build_epoch,
                "languages": metadata.languages,
                "description": metadata.description,
            },
            "layout": {
                "tree_size": header.tree_size,
                "data_section_start": header.data_section_start,
                "data_section_size": header.data_section_len(),
            },
        });

        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Database: {}", database.display());
    println!("Size:     {}", format_bytes(db.size()));
    println!();
    println!("Metadata:");
    println!("  Database type:   {}", metadata.database_type);
    println!(
        "  Format version:  {}.{}",
        metadata.binary_format_major_version, metadata.binary_format_minor_version
    );
    println!(
        "  Build time:      {} ({})",
        format_unix_timestamp(metadata.build_epoch),
        metadata.build_epoch
    );
    println!("  IP version:      IPv{}", metadata.ip_version.number());
    println!("  Node count:      {}", metadata.node_count);
    println!("  Record size:     {} bits", metadata.record_size.bits());
    if !metadata.languages.is_empty() {
        println!("  Languages:       {}", metadata.languages.join(", "));
    }
    if !metadata.description.is_empty() {
        println!("  Description:");
        let mut descriptions: Vec<_> = metadata.description.iter().collect();
        descriptions.sort();
        for (lang, text) in descriptions {
            println!("    {}: {}", lang, text);
        }
    }
    println!();
    println!("Layout:");
    println!("  Search tree:     {}", format_bytes(header.tree_size));
    println!("  Data section:    {}", format_bytes(header.data_section_len()));

    Ok(())
}
