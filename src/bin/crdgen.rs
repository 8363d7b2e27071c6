//! CRD YAML Generator
//!
//! Prints the APIManager CRD manifest.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/apimanager.yaml

use apimanager_operator::crd::generate_crds;

fn main() -> anyhow::Result<()> {
    for crd in generate_crds()? {
        println!("---");
        print!("{}", crd);
    }
    Ok(())
}
