use super::CoordinateProvider;
use crate::config::{Coordinate, ResourceId};

/// In-memory coordinate list, as recorded in the project.
#[derive(Debug, Clone, Default)]
pub struct CoordinateStore {
    coordinates: Vec<Coordinate>,
}

impl CoordinateStore {
    pub fn new(coordinates: Vec<Coordinate>) -> Self {
        Self { coordinates }
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }
}

impl CoordinateProvider for CoordinateStore {
    fn get_coordinate(&self, id: ResourceId) -> Option<Coordinate> {
        self.coordinates.iter().find(|c| c.id == id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(id: ResourceId, x: i32) -> Coordinate {
        Coordinate {
            id,
            name: format!("c{id}"),
            x,
            y: 0,
            description: String::new(),
            thumbnail: None,
        }
    }

    #[test]
    fn test_lookup_by_id() {
        let store = CoordinateStore::new(vec![coord(1, 10), coord(4, 40)]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get_coordinate(4).unwrap().x, 40);
        assert!(store.get_coordinate(2).is_none());
    }
}
