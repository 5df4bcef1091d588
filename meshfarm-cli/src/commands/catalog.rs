//! Catalog command - list entries, tiers and modes.

use std::path::Path;

use meshfarm::catalog::CatalogRegistry;

use crate::error::CliError;
use crate::runner::load_config;

/// Run the catalog command.
///
/// Reads only the configured catalog; no engine is started.
pub fn run(config_path: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let catalog = match &config.catalog.path {
        Some(path) => CatalogRegistry::from_json_file(path).map_err(CliError::Plan)?,
        None => CatalogRegistry::builtin(),
    };
    print!("{}", render(&catalog));
    Ok(())
}

fn render(catalog: &CatalogRegistry) -> String {
    let mut out = String::new();

    out.push_str("Quality Tiers\n");
    out.push_str("=============\n");
    for tier in catalog.tiers() {
        out.push_str(&format!(
            "  {:<10} {:>7} triangles, {:>5}px textures\n",
            tier.name, tier.target_triangles, tier.texture_size
        ));
    }

    out.push('\n');
    out.push_str(&format!("Entries ({})\n", catalog.len()));
    out.push_str("=============\n");
    for entry in catalog.entries() {
        let modes: Vec<&str> = entry.modes.iter().map(|m| m.as_str()).collect();
        out.push_str(&format!(
            "  {:<12} {:<20} {:<10} tiers: {}  modes: {}\n",
            entry.id,
            entry.display_name,
            entry.template.as_str(),
            entry.tiers.join(","),
            modes.join(",")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_lists_every_entry_and_tier() {
        let catalog = CatalogRegistry::builtin();
        let text = render(&catalog);

        for tier in catalog.tiers() {
            assert!(text.contains(&tier.name));
        }
        for entry in catalog.entries() {
            assert!(text.contains(&entry.id));
        }
        assert!(text.contains(&format!("Entries ({})", catalog.len())));
    }
}
