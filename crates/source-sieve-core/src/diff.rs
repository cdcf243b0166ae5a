//! Line-level diff for near-duplicate confirmation.
//!
//! Two sources are similar when the zero-context unified diff between them is
//! short relative to their combined line count. The diff is a Myers shortest
//! edit script computed after trimming the common prefix and suffix, and it
//! gives up as soon as the edit count alone rules similarity out, so unrelated
//! files are rejected without paying for a full diff.

/// Shape of a line diff: enough to know how long its unified form is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineDiff {
    pub deletions: usize,
    pub insertions: usize,
    /// Maximal runs of changed lines.
    pub hunks: usize,
}

impl LineDiff {
    pub fn is_empty(&self) -> bool {
        self.hunks == 0
    }

    /// Lines in the zero-context unified diff: two file headers, one `@@`
    /// header per hunk, one line per deleted or inserted line.
    pub fn unified_len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            2 + self.hunks + self.deletions + self.insertions
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Keep,
    Delete,
    Insert,
}

/// Diff two line slices. Returns `None` when more than `max_edits` line
/// insertions plus deletions are needed.
pub fn diff_lines(a: &[&str], b: &[&str], max_edits: Option<usize>) -> Option<LineDiff> {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let (a, b) = (&a[prefix..], &b[prefix..]);
    let suffix = a
        .iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let (a, b) = (&a[..a.len() - suffix], &b[..b.len() - suffix]);

    let max_edits = max_edits.unwrap_or(usize::MAX);
    if a.is_empty() || b.is_empty() {
        let edits = a.len() + b.len();
        if edits > max_edits {
            return None;
        }
        return Some(LineDiff {
            deletions: a.len(),
            insertions: b.len(),
            hunks: usize::from(edits > 0),
        });
    }

    let script = shortest_edit_script(a, b, max_edits)?;
    let mut diff = LineDiff::default();
    let mut in_hunk = false;
    for edit in script {
        match edit {
            Edit::Keep => in_hunk = false,
            Edit::Delete | Edit::Insert => {
                if edit == Edit::Delete {
                    diff.deletions += 1;
                } else {
                    diff.insertions += 1;
                }
                if !in_hunk {
                    diff.hunks += 1;
                    in_hunk = true;
                }
            }
        }
    }
    Some(diff)
}

/// Myers' greedy algorithm. `trace[d]` holds the furthest-reaching `x` per
/// diagonal `k` in `[-d-1, d+1]` before step `d`.
fn shortest_edit_script(a: &[&str], b: &[&str], max_edits: usize) -> Option<Vec<Edit>> {
    let (n, m) = (a.len() as isize, b.len() as isize);
    let max = a.len() + b.len();
    let offset = max as isize + 1;
    let mut v = vec![0isize; 2 * max + 3];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    for d in 0..=max.min(max_edits) as isize {
        trace.push(v[(offset - d - 1) as usize..=(offset + d + 1) as usize].to_vec());
        let mut k = -d;
        while k <= d {
            let i = (offset + k) as usize;
            let mut x = if k == -d || (k != d && v[i - 1] < v[i + 1]) {
                v[i + 1]
            } else {
                v[i - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[i] = x;
            if x >= n && y >= m {
                return Some(backtrack(&trace, n, m));
            }
            k += 2;
        }
    }
    None
}

fn backtrack(trace: &[Vec<isize>], n: isize, m: isize) -> Vec<Edit> {
    let (mut x, mut y) = (n, m);
    let mut edits = Vec::new();
    for (d, window) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let at = |k: isize| window[(k + d + 1) as usize];
        let k = x - y;
        let prev_k = if k == -d || (k != d && at(k - 1) < at(k + 1)) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = at(prev_k);
        let prev_y = prev_x - prev_k;
        while x > prev_x && y > prev_y {
            edits.push(Edit::Keep);
            x -= 1;
            y -= 1;
        }
        if d > 0 {
            edits.push(if x == prev_x { Edit::Insert } else { Edit::Delete });
        }
        x = prev_x;
        y = prev_y;
    }
    edits.reverse();
    edits
}

/// Whether the unified diff of `a` and `b`, divided by their combined line
/// count, is below `max_ratio`. Lines are split on `\n`.
pub fn is_similar(a: &str, b: &str, max_ratio: f64) -> bool {
    let lines_a: Vec<&str> = a.split('\n').collect();
    let lines_b: Vec<&str> = b.split('\n').collect();
    let total = (lines_a.len() + lines_b.len()) as f64;
    let budget = (max_ratio * total).ceil() as usize;
    match diff_lines(&lines_a, &lines_b, Some(budget)) {
        Some(diff) => (diff.unified_len() as f64) / total < max_ratio,
        None => false,
    }
}

/// Every source in `sources` has a similar counterpart in `against`.
///
/// Not a one-to-one pairing: several sources may match the same counterpart.
pub fn all_similar<A, B>(sources: &[A], against: &[B], max_ratio: f64) -> bool
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    sources.iter().all(|a| {
        against
            .iter()
            .any(|b| is_similar(a.as_ref(), b.as_ref(), max_ratio))
    })
}
