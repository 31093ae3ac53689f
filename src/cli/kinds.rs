//! Print the entity registry

use learou_core::{error::Result, Registry, RouteAction, RouteSet};

pub fn handle(show_routes: bool) -> Result<()> {
    let registry = Registry::learou()?;

    println!("{} entity kinds:", registry.len());
    for kind in registry.kinds() {
        println!("  {:<30} {}", kind.slug, kind.display_name);
        if show_routes {
            let routes = RouteSet::new(kind.slug);
            for action in RouteAction::ALL {
                println!(
                    "      {:<40} {}",
                    routes.name(action),
                    routes.pattern(action)
                );
            }
        }
    }
    Ok(())
}
