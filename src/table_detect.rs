use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::model::{Cell, PageText};
use crate::options::TableSettings;
use crate::page_layout::{BBox, Edge, Orientation, PageChar, PageLayout};
use crate::table_parse::{soft_split_line_into_cells, split_line_into_cells};

/// Horizontal gap, in points, above which two characters belong to different words.
const WORD_GAP_TOLERANCE: f64 = 3.0;
/// Vertical distance, in points, within which characters share a text line.
const LINE_TOLERANCE: f64 = 3.0;

type PointKey = (i64, i64);

fn float_key(value: f64) -> i64 {
    (value * 1000.0).round() as i64
}

fn cmp_f64(a: f64, b: f64) -> std::cmp::Ordering {
    a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
}

/// Clusters parallel edges along their perpendicular axis and moves every member
/// of a cluster to the cluster mean.
fn snap_edges(edges: Vec<Edge>, tolerance: f64) -> Vec<Edge> {
    let (mut horizontals, mut verticals): (Vec<Edge>, Vec<Edge>) = edges
        .into_iter()
        .partition(|edge| edge.orientation == Orientation::Horizontal);

    snap_group(&mut horizontals, tolerance, |edge| edge.top, |edge, value| {
        edge.top = value;
        edge.bottom = value;
    });
    snap_group(&mut verticals, tolerance, |edge| edge.x0, |edge, value| {
        edge.x0 = value;
        edge.x1 = value;
    });

    horizontals.extend(verticals);
    horizontals
}

fn snap_group<K, S>(edges: &mut [Edge], tolerance: f64, key: K, mut set: S)
where
    K: Fn(&Edge) -> f64,
    S: FnMut(&mut Edge, f64),
{
    if edges.is_empty() {
        return;
    }
    edges.sort_by(|a, b| cmp_f64(key(a), key(b)));

    let mut cluster_start = 0;
    for index in 1..=edges.len() {
        let end_of_cluster = index == edges.len()
            || key(&edges[index]) - key(&edges[index - 1]) > tolerance;
        if end_of_cluster {
            let members = &mut edges[cluster_start..index];
            let mean = members.iter().map(&key).sum::<f64>() / members.len() as f64;
            for edge in members {
                set(edge, mean);
            }
            cluster_start = index;
        }
    }
}

/// Merges collinear edges whose gap along their own axis is within `tolerance`.
fn join_edges(edges: Vec<Edge>, tolerance: f64) -> Vec<Edge> {
    let mut lines: BTreeMap<(bool, i64), Vec<Edge>> = BTreeMap::new();
    for edge in edges {
        let horizontal = edge.orientation == Orientation::Horizontal;
        let position = if horizontal { edge.top } else { edge.x0 };
        lines
            .entry((horizontal, float_key(position)))
            .or_default()
            .push(edge);
    }

    let mut joined = Vec::new();
    for ((horizontal, _), mut group) in lines {
        let span = |edge: &Edge| {
            if horizontal {
                (edge.x0, edge.x1)
            } else {
                (edge.top, edge.bottom)
            }
        };
        group.sort_by(|a, b| cmp_f64(span(a).0, span(b).0));

        let mut current = group[0];
        for edge in group.into_iter().skip(1) {
            let (start, end) = span(&edge);
            let (_, current_end) = span(&current);
            if start <= current_end + tolerance {
                if end > current_end {
                    if horizontal {
                        current.x1 = end;
                    } else {
                        current.bottom = end;
                    }
                }
            } else {
                joined.push(current);
                current = edge;
            }
        }
        joined.push(current);
    }

    joined
}

/// Edges crossing at each intersection point, by index into the edge list.
#[derive(Debug, Default)]
struct Crossing {
    horizontal: BTreeSet<usize>,
    vertical: BTreeSet<usize>,
}

fn edges_to_intersections(edges: &[Edge], tolerance: f64) -> BTreeMap<PointKey, Crossing> {
    let mut intersections: BTreeMap<PointKey, Crossing> = BTreeMap::new();

    for (h_index, h) in edges
        .iter()
        .enumerate()
        .filter(|(_, edge)| edge.orientation == Orientation::Horizontal)
    {
        for (v_index, v) in edges
            .iter()
            .enumerate()
            .filter(|(_, edge)| edge.orientation == Orientation::Vertical)
        {
            if v.x0 >= h.x0 - tolerance
                && v.x0 <= h.x1 + tolerance
                && h.top >= v.top - tolerance
                && h.top <= v.bottom + tolerance
            {
                let crossing = intersections
                    .entry((float_key(v.x0), float_key(h.top)))
                    .or_default();
                crossing.horizontal.insert(h_index);
                crossing.vertical.insert(v_index);
            }
        }
    }

    intersections
}

fn edge_connects(
    intersections: &BTreeMap<PointKey, Crossing>,
    a: PointKey,
    b: PointKey,
) -> bool {
    let (Some(first), Some(second)) = (intersections.get(&a), intersections.get(&b)) else {
        return false;
    };
    if a.0 == b.0 && !first.vertical.is_disjoint(&second.vertical) {
        return true;
    }
    a.1 == b.1 && !first.horizontal.is_disjoint(&second.horizontal)
}

/// For every intersection, finds the smallest rectangle whose four corners are
/// intersections joined by actual edges.
fn intersections_to_cells(intersections: &BTreeMap<PointKey, Crossing>) -> Vec<BBox> {
    let points = intersections.keys().copied().collect::<Vec<_>>();
    let mut cells = Vec::new();

    for (index, &point) in points.iter().enumerate() {
        let rest = &points[index + 1..];
        let below = rest.iter().filter(|candidate| candidate.0 == point.0);
        let right = rest
            .iter()
            .filter(|candidate| candidate.1 == point.1)
            .collect::<Vec<_>>();

        'search: for &below_point in below {
            if !edge_connects(intersections, point, below_point) {
                continue;
            }
            for &&right_point in &right {
                if !edge_connects(intersections, point, right_point) {
                    continue;
                }
                let corner = (right_point.0, below_point.1);
                if intersections.contains_key(&corner)
                    && edge_connects(intersections, corner, right_point)
                    && edge_connects(intersections, corner, below_point)
                {
                    cells.push(BBox::new(
                        point.0 as f64 / 1000.0,
                        point.1 as f64 / 1000.0,
                        corner.0 as f64 / 1000.0,
                        corner.1 as f64 / 1000.0,
                    ));
                    break 'search;
                }
            }
        }
    }

    cells
}

fn corner_keys(cell: &BBox) -> [PointKey; 4] {
    let (x0, x1) = (float_key(cell.x0), float_key(cell.x1));
    let (top, bottom) = (float_key(cell.top), float_key(cell.bottom));
    [(x0, top), (x1, top), (x0, bottom), (x1, bottom)]
}

/// Groups cells that share a corner. Groups with a single cell are dropped and the
/// rest are ordered top-to-bottom, then left-to-right.
fn cells_to_tables(cells: &[BBox]) -> Vec<Vec<BBox>> {
    fn find(parent: &mut [usize], mut index: usize) -> usize {
        while parent[index] != index {
            parent[index] = parent[parent[index]];
            index = parent[index];
        }
        index
    }

    let mut parent = (0..cells.len()).collect::<Vec<_>>();
    let mut owners: HashMap<PointKey, usize> = HashMap::new();
    for (index, cell) in cells.iter().enumerate() {
        for corner in corner_keys(cell) {
            if let Some(&other) = owners.get(&corner) {
                let (a, b) = (find(&mut parent, index), find(&mut parent, other));
                if a != b {
                    parent[b] = a;
                }
            } else {
                owners.insert(corner, index);
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<BBox>> = BTreeMap::new();
    for (index, cell) in cells.iter().enumerate() {
        let root = find(&mut parent, index);
        groups.entry(root).or_default().push(*cell);
    }

    let mut tables = groups
        .into_values()
        .filter(|group| group.len() > 1)
        .collect::<Vec<_>>();
    tables.sort_by(|a, b| {
        let bounds_a = a.iter().skip(1).fold(a[0], |acc, cell| acc.union(cell));
        let bounds_b = b.iter().skip(1).fold(b[0], |acc, cell| acc.union(cell));
        cmp_f64(bounds_a.top, bounds_b.top).then_with(|| cmp_f64(bounds_a.x0, bounds_b.x0))
    });
    tables
}

fn char_in_cell(ch: &PageChar, cell: &BBox) -> bool {
    let (x, y) = ch.bbox.center();
    x >= cell.x0 && x < cell.x1 && y >= cell.top && y < cell.bottom
}

/// Joins characters into text: lines top-to-bottom separated by `\n`, words
/// separated by a single space.
fn chars_to_text(chars: &[&PageChar]) -> String {
    let mut sorted = chars.to_vec();
    sorted.sort_by(|a, b| {
        cmp_f64(a.bbox.top, b.bbox.top).then_with(|| cmp_f64(a.bbox.x0, b.bbox.x0))
    });

    let mut lines: Vec<Vec<&PageChar>> = Vec::new();
    for ch in sorted {
        let same_line = lines
            .last()
            .is_some_and(|line| (ch.bbox.top - line[0].bbox.top).abs() <= LINE_TOLERANCE);
        if let (true, Some(line)) = (same_line, lines.last_mut()) {
            line.push(ch);
        } else {
            lines.push(vec![ch]);
        }
    }

    lines
        .into_iter()
        .map(|mut line| {
            line.sort_by(|a, b| cmp_f64(a.bbox.x0, b.bbox.x0));
            let mut text = String::new();
            let mut previous_x1: Option<f64> = None;
            for ch in line {
                if let Some(x1) = previous_x1 {
                    if ch.bbox.x0 - x1 > WORD_GAP_TOLERANCE && !text.ends_with(' ') {
                        text.push(' ');
                    }
                }
                if ch.text.is_whitespace() {
                    if !text.is_empty() && !text.ends_with(' ') {
                        text.push(' ');
                    }
                } else {
                    text.push(ch.text);
                }
                previous_x1 = Some(ch.bbox.x1);
            }
            text.trim_end().to_string()
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lays a table's cells onto the table's column grid. Grid slots without a cell
/// become `None`; cells without characters become empty strings.
fn table_rows(cells: &[BBox], chars: &[PageChar]) -> Vec<Vec<Cell>> {
    let columns = cells
        .iter()
        .map(|cell| float_key(cell.x0))
        .collect::<BTreeSet<_>>();

    let mut by_top: BTreeMap<i64, Vec<&BBox>> = BTreeMap::new();
    for cell in cells {
        by_top.entry(float_key(cell.top)).or_default().push(cell);
    }

    by_top
        .into_values()
        .map(|row_cells| {
            columns
                .iter()
                .map(|column| {
                    row_cells
                        .iter()
                        .find(|cell| float_key(cell.x0) == *column)
                        .map(|cell| {
                            let inside = chars
                                .iter()
                                .filter(|ch| char_in_cell(ch, cell))
                                .collect::<Vec<_>>();
                            chars_to_text(&inside)
                        })
                })
                .collect()
        })
        .collect()
}

/// Finds tables bounded by ruling lines and rectangle edges.
pub(crate) fn find_ruled_tables(
    layout: &PageLayout,
    settings: &TableSettings,
) -> Vec<Vec<Vec<Cell>>> {
    let snapped = snap_edges(layout.edges.clone(), settings.snap_tolerance);
    let edges = join_edges(snapped, settings.join_tolerance)
        .into_iter()
        .filter(|edge| edge.length() >= settings.edge_min_length)
        .collect::<Vec<_>>();

    let intersections = edges_to_intersections(&edges, settings.intersection_tolerance);
    let cells = intersections_to_cells(&intersections);
    cells_to_tables(&cells)
        .iter()
        .map(|table| table_rows(table, &layout.chars))
        .collect()
}

/// Finds runs of at least two consecutive lines that split into `min_cols` or
/// more cells.
pub(crate) fn find_text_tables(page: &PageText, min_cols: usize) -> Vec<Vec<Vec<Cell>>> {
    let mut tables = Vec::new();
    let mut current_rows: Vec<Vec<Cell>> = Vec::new();

    let flush_current = |rows: &mut Vec<Vec<Cell>>, tables: &mut Vec<Vec<Vec<Cell>>>| {
        if rows.len() >= 2 {
            tables.push(std::mem::take(rows));
        } else {
            rows.clear();
        }
    };

    for line in page.text.lines() {
        let mut cells = split_line_into_cells(line);
        if cells.len() < min_cols {
            let soft_cells = soft_split_line_into_cells(line);
            let has_numeric = soft_cells
                .iter()
                .any(|cell| cell.chars().any(|ch| ch.is_ascii_digit()));
            let looks_like_sentence = ['.', '!', '?']
                .iter()
                .any(|punctuation| line.trim_end().ends_with(*punctuation));
            if soft_cells.len() >= min_cols
                && !looks_like_sentence
                && (has_numeric || soft_cells.len() <= 6)
            {
                cells = soft_cells;
            }
        }

        if cells.len() >= min_cols {
            current_rows.push(cells.into_iter().map(Some).collect());
        } else {
            flush_current(&mut current_rows, &mut tables);
        }
    }

    flush_current(&mut current_rows, &mut tables);
    tables
}
