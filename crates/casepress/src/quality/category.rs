use serde::{Deserialize, Serialize};

/// Fixed scoring categories of the quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Structure,
    Discoverability,
    Readability,
    Trust,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Structure,
        Category::Discoverability,
        Category::Readability,
        Category::Trust,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Structure => "structure",
            Category::Discoverability => "discoverability",
            Category::Readability => "readability",
            Category::Trust => "trust",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per category. Used for scores, thresholds and weights alike.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoryValues<T> {
    pub structure: T,
    pub discoverability: T,
    pub readability: T,
    pub trust: T,
}

impl<T: Copy> CategoryValues<T> {
    pub fn uniform(value: T) -> Self {
        Self {
            structure: value,
            discoverability: value,
            readability: value,
            trust: value,
        }
    }

    pub fn get(&self, category: Category) -> T {
        match category {
            Category::Structure => self.structure,
            Category::Discoverability => self.discoverability,
            Category::Readability => self.readability,
            Category::Trust => self.trust,
        }
    }

    pub fn set(&mut self, category: Category, value: T) {
        match category {
            Category::Structure => self.structure = value,
            Category::Discoverability => self.discoverability = value,
            Category::Readability => self.readability = value,
            Category::Trust => self.trust = value,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, T)> + '_ {
        Category::ALL.into_iter().map(move |c| (c, self.get(c)))
    }
}

impl CategoryValues<f64> {
    pub fn sum(&self) -> f64 {
        self.iter().map(|(_, w)| w).sum()
    }
}
