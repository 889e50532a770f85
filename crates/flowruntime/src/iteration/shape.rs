use flowcore::Index;

/// Structure of an iterated collection: where items sit and which lists
/// exist, empty ones included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Item,
    List(Vec<Shape>),
}

impl Shape {
    /// Cross product: every item of `self` becomes a copy of `other`.
    pub fn graft(&self, other: &Shape) -> Shape {
        match self {
            Shape::Item => other.clone(),
            Shape::List(children) => {
                Shape::List(children.iter().map(|child| child.graft(other)).collect())
            }
        }
    }

    /// Dot product: positions present in both, truncated to the shorter list.
    pub fn zip(&self, other: &Shape) -> Shape {
        match (self, other) {
            (Shape::List(left), Shape::List(right)) => Shape::List(
                left.iter()
                    .zip(right.iter())
                    .map(|(l, r)| l.zip(r))
                    .collect(),
            ),
            _ => Shape::Item,
        }
    }

    /// Every list index with its length, children before their parent.
    pub fn lists_post_order(&self) -> Vec<(Index, usize)> {
        let mut out = Vec::new();
        self.visit_lists(&mut Vec::new(), &mut out);
        out
    }

    fn visit_lists(&self, prefix: &mut Index, out: &mut Vec<(Index, usize)>) {
        if let Shape::List(children) = self {
            for (i, child) in children.iter().enumerate() {
                prefix.push(i);
                child.visit_lists(prefix, out);
                prefix.pop();
            }
            out.push((prefix.clone(), children.len()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(children: Vec<Shape>) -> Shape {
        Shape::List(children)
    }

    #[test]
    fn graft_nests_right_under_left() {
        let left = list(vec![Shape::Item, Shape::Item]);
        let right = list(vec![Shape::Item]);
        assert_eq!(
            left.graft(&right),
            list(vec![list(vec![Shape::Item]), list(vec![Shape::Item])])
        );
    }

    #[test]
    fn graft_onto_empty_stays_empty() {
        let empty = list(vec![]);
        assert_eq!(empty.graft(&list(vec![Shape::Item])), list(vec![]));
    }

    #[test]
    fn zip_truncates() {
        let left = list(vec![Shape::Item, Shape::Item, Shape::Item]);
        let right = list(vec![Shape::Item]);
        assert_eq!(left.zip(&right), list(vec![Shape::Item]));
    }

    #[test]
    fn post_order_lists_include_empty_sublists() {
        let shape = list(vec![list(vec![]), list(vec![Shape::Item])]);
        assert_eq!(
            shape.lists_post_order(),
            vec![(vec![0], 0), (vec![1], 1), (vec![], 2)]
        );
        assert!(Shape::Item.lists_post_order().is_empty());
    }
}
