//! ASCII tree rendering for committed universes.

use crate::models::{Galaxy, Planet, Star, Universe};

const ALIVE: char = '★';
const DEAD: char = '☆';

struct Node {
    label: String,
    children: Vec<Node>,
}

fn star_symbol(star: &Star) -> char {
    if star.alive {
        ALIVE
    } else {
        DEAD
    }
}

fn planet_node(planet: &Planet) -> Node {
    Node {
        label: format!("{} (orbit {})", planet.name, planet.orbit),
        children: Vec::new(),
    }
}

fn star_node(star: &Star) -> Node {
    Node {
        label: format!("{} {} (orbit {})", star_symbol(star), star.name, star.orbit),
        children: star.planets.iter().map(planet_node).collect(),
    }
}

fn galaxy_node(galaxy: &Galaxy) -> Node {
    Node {
        label: galaxy.name.clone(),
        children: galaxy.stars.iter().map(star_node).collect(),
    }
}

/// Render a universe as ASCII art, galaxies and stars in ledger order.
///
/// Example output:
/// ```text
/// Universe 0x000000…0abc
/// ├── Andromeda
/// │   ├── ★ Sun (orbit 1)
/// │   │   └── Earth (orbit 3)
/// │   └── ☆ Vega (orbit 2)
/// └── Milky Way
/// ```
pub fn render_universe(universe: &Universe) -> String {
    let root = Node {
        label: format!("Universe {}", universe.id.short()),
        children: universe.galaxies.iter().map(galaxy_node).collect(),
    };
    let mut output = String::new();
    render_node(&mut output, &root, "", true, true);
    output
}

/// One-line summary, e.g. `0x000000…0abc  2 galaxies, 3 stars, 5 planets`.
pub fn summarize(universe: &Universe) -> String {
    format!(
        "{}  {} galaxies, {} stars, {} planets",
        universe.id.short(),
        universe.galaxies.len(),
        universe.star_count(),
        universe.planet_count()
    )
}

fn render_node(output: &mut String, node: &Node, prefix: &str, is_last: bool, is_root: bool) {
    if !is_root {
        output.push_str(prefix);
        output.push_str(if is_last { "└── " } else { "├── " });
    }
    output.push_str(&node.label);
    output.push('\n');

    let child_prefix = if is_root {
        String::new()
    } else {
        let continuation = if is_last { "    " } else { "│   " };
        format!("{}{}", prefix, continuation)
    };

    for (i, child) in node.children.iter().enumerate() {
        let child_is_last = i == node.children.len() - 1;
        render_node(output, child, &child_prefix, child_is_last, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObjectId;

    fn star(name: &str, orbit: u8, alive: bool, planets: Vec<Planet>) -> Star {
        Star {
            name: name.to_string(),
            orbit,
            alive,
            planets,
        }
    }

    fn planet(name: &str, orbit: u8) -> Planet {
        Planet {
            name: name.to_string(),
            orbit,
        }
    }

    #[test]
    fn test_empty_universe() {
        let universe = Universe {
            id: ObjectId::from_u128(0xabc),
            galaxies: vec![],
        };
        assert_eq!(render_universe(&universe), "Universe 0x000000…0abc\n");
    }

    #[test]
    fn test_nested_tree() {
        let universe = Universe {
            id: ObjectId::from_u128(0xabc),
            galaxies: vec![
                Galaxy {
                    name: "Andromeda".to_string(),
                    stars: vec![
                        star("Sun", 1, true, vec![planet("Earth", 3)]),
                        star("Vega", 2, false, vec![]),
                    ],
                },
                Galaxy {
                    name: "Milky Way".to_string(),
                    stars: vec![],
                },
            ],
        };

        let expected = "Universe 0x000000…0abc\n├── Andromeda\n│   ├── ★ Sun (orbit 1)\n│   │   └── Earth (orbit 3)\n│   └── ☆ Vega (orbit 2)\n└── Milky Way\n";
        assert_eq!(render_universe(&universe), expected);
    }

    #[test]
    fn test_summary_counts() {
        let universe = Universe {
            id: ObjectId::from_u128(0xabc),
            galaxies: vec![Galaxy {
                name: "G".to_string(),
                stars: vec![star("S", 1, true, vec![planet("A", 1), planet("B", 2)])],
            }],
        };
        assert_eq!(
            summarize(&universe),
            "0x000000…0abc  1 galaxies, 1 stars, 2 planets"
        );
    }
}
