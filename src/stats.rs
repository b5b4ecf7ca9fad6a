//! Index statistics overview.
//!
//! Gives a quick summary of what each agent has indexed: document and
//! embedding counts, dimensionality, and the PDF share of the corpus.
//! Used by `cqa stats` to confirm that offline indexing worked.

use anyhow::Result;

use crate::registry::AgentRegistry;

/// Run the stats command: print a summary per agent.
pub fn run_stats(registry: &AgentRegistry, agent: Option<&str>) -> Result<()> {
    let names: Vec<String> = match agent {
        Some(name) => vec![registry.resolve(Some(name))?.name.clone()],
        None => registry.names().iter().map(|s| s.to_string()).collect(),
    };

    println!("campus-qa — Index Stats");
    println!("=======================");

    for name in names {
        let agent = registry
            .get(&name)
            .expect("names() only returns registered agents");
        let docs = agent.index.documents();
        let pdf_count = docs.iter().filter(|d| d.is_pdf()).count();
        let default_marker = if registry.default_name() == Some(name.as_str()) {
            " (default)"
        } else {
            ""
        };

        println!();
        println!("  Agent:      {}{}", agent.name, default_marker);
        println!("  Data dir:   {}", agent.data_dir.display());
        println!("  Backend:    {}", agent.index.backend_kind());
        println!("  Documents:  {}", docs.len());
        println!(
            "  Embedded:   {} rows x {} dims",
            agent.index.embedded_rows(),
            agent.index.dims().unwrap_or(0)
        );
        println!(
            "  PDFs:       {} / {} ({}%)",
            pdf_count,
            docs.len(),
            if docs.is_empty() {
                0
            } else {
                pdf_count * 100 / docs.len()
            }
        );
    }

    println!();
    Ok(())
}
