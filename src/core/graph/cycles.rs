//! Elementary cycle enumeration (Johnson's algorithm)
//!
//! Works on a dense integer graph given as sorted adjacency lists. For every
//! start vertex `s`, in increasing order, the strongly connected component
//! containing the least vertex of the subgraph induced by `s..n` is searched
//! for circuits through that vertex. Blocking keeps the search from revisiting
//! dead ends, which bounds the cost at O((V + E)(C + 1)).

/// Enumerate every elementary cycle of `adjacency`
///
/// Each cycle is listed starting from its smallest vertex, without repeating
/// it at the end.
pub(crate) fn elementary_cycles(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = adjacency.len();
    let mut cycles = Vec::new();
    let mut search = CircuitSearch {
        adjacency,
        blocked: vec![false; n],
        blocked_by: vec![Vec::new(); n],
        in_component: vec![false; n],
        path: Vec::new(),
    };

    let mut start = 0;
    while start < n {
        let Some(component) = least_cyclic_component(adjacency, start) else {
            break;
        };
        let Some(&root) = component.iter().min() else {
            break;
        };

        for &v in &component {
            search.in_component[v] = true;
            search.blocked[v] = false;
            search.blocked_by[v].clear();
        }
        search.circuit(root, root, &mut cycles);
        for &v in &component {
            search.in_component[v] = false;
        }

        start = root + 1;
    }

    cycles
}

struct CircuitSearch<'a> {
    adjacency: &'a [Vec<usize>],
    blocked: Vec<bool>,
    blocked_by: Vec<Vec<usize>>,
    in_component: Vec<bool>,
    path: Vec<usize>,
}

impl CircuitSearch<'_> {
    fn circuit(&mut self, v: usize, root: usize, cycles: &mut Vec<Vec<usize>>) -> bool {
        let adjacency = self.adjacency;
        let mut found = false;
        self.path.push(v);
        self.blocked[v] = true;

        for &w in &adjacency[v] {
            if !self.in_component[w] {
                continue;
            }
            if w == root {
                cycles.push(self.path.clone());
                found = true;
            } else if !self.blocked[w] && self.circuit(w, root, cycles) {
                found = true;
            }
        }

        if found {
            self.unblock(v);
        } else {
            for &w in &adjacency[v] {
                if self.in_component[w] && !self.blocked_by[w].contains(&v) {
                    self.blocked_by[w].push(v);
                }
            }
        }

        self.path.pop();
        found
    }

    fn unblock(&mut self, u: usize) {
        self.blocked[u] = false;
        let waiting = std::mem::take(&mut self.blocked_by[u]);
        for w in waiting {
            if self.blocked[w] {
                self.unblock(w);
            }
        }
    }
}

/// Strongly connected component, among vertices `>= start`, that contains a
/// cycle and has the smallest least vertex
fn least_cyclic_component(adjacency: &[Vec<usize>], start: usize) -> Option<Vec<usize>> {
    let n = adjacency.len();
    let mut tarjan = Tarjan {
        adjacency,
        start,
        index: vec![None; n],
        low: vec![0; n],
        on_stack: vec![false; n],
        stack: Vec::new(),
        next: 0,
        components: Vec::new(),
    };
    for v in start..n {
        if tarjan.index[v].is_none() {
            tarjan.visit(v);
        }
    }

    tarjan
        .components
        .into_iter()
        .filter(|c| c.len() > 1 || adjacency[c[0]].contains(&c[0]))
        .min_by_key(|c| c.iter().copied().min().unwrap_or(usize::MAX))
}

struct Tarjan<'a> {
    adjacency: &'a [Vec<usize>],
    start: usize,
    index: Vec<Option<usize>>,
    low: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next: usize,
    components: Vec<Vec<usize>>,
}

impl Tarjan<'_> {
    fn visit(&mut self, v: usize) {
        let adjacency = self.adjacency;
        self.index[v] = Some(self.next);
        self.low[v] = self.next;
        self.next += 1;
        self.stack.push(v);
        self.on_stack[v] = true;

        for &w in &adjacency[v] {
            if w < self.start {
                continue;
            }
            match self.index[w] {
                None => {
                    self.visit(w);
                    self.low[v] = self.low[v].min(self.low[w]);
                }
                Some(iw) if self.on_stack[w] => {
                    self.low[v] = self.low[v].min(iw);
                }
                Some(_) => {}
            }
        }

        if self.index[v] == Some(self.low[v]) {
            let mut component = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triangle() {
        let adjacency = vec![vec![1], vec![2], vec![0]];
        assert_eq!(elementary_cycles(&adjacency), vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_self_loop() {
        let adjacency = vec![vec![0, 1], vec![]];
        assert_eq!(elementary_cycles(&adjacency), vec![vec![0]]);
    }

    #[test]
    fn test_acyclic() {
        let adjacency = vec![vec![1, 2], vec![2], vec![]];
        assert!(elementary_cycles(&adjacency).is_empty());
    }

    #[test]
    fn test_complete_graph_on_three_vertices() {
        // K3 with both directions on every pair: 3 two-cycles and 2 three-cycles
        let adjacency = vec![vec![1, 2], vec![0, 2], vec![0, 1]];
        let cycles = elementary_cycles(&adjacency);
        assert_eq!(cycles.len(), 5);
        assert!(cycles.contains(&vec![0, 1]));
        assert!(cycles.contains(&vec![0, 2]));
        assert!(cycles.contains(&vec![1, 2]));
        assert!(cycles.contains(&vec![0, 1, 2]));
        assert!(cycles.contains(&vec![0, 2, 1]));
    }

    #[test]
    fn test_disjoint_components() {
        let adjacency = vec![vec![1], vec![0], vec![3], vec![2]];
        assert_eq!(elementary_cycles(&adjacency), vec![vec![0, 1], vec![2, 3]]);
    }
}
