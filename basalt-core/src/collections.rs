//! Shared collection aliases: hashbrown maps/sets seeded with foldhash and
//! SmallVec for short inline lists.

pub use smallvec::SmallVec;

pub mod hashmap {
    pub type HashMap<K, V> = hashbrown::HashMap<K, V, foldhash::fast::RandomState>;
}

pub mod hashset {
    pub type HashSet<T> = hashbrown::HashSet<T, foldhash::fast::RandomState>;
}

pub use hashmap::HashMap;
pub use hashset::HashSet;
