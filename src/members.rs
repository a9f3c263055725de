//! Ordering of class members and grouping of fields into multi-declarator statements.

use crate::ast::{ClassDeclaration, FieldDeclaration, MemberDeclaration, MethodDeclaration};

/// Interleaves the three member lists by first line without reordering any list.
///
/// A head without a line number is taken as soon as it reaches the front of its list. Ties go
/// to fields, then methods, then nested types.
pub fn merge(
    fields: Vec<FieldDeclaration>,
    methods: Vec<MethodDeclaration>,
    inner_types: Vec<ClassDeclaration>,
) -> Vec<MemberDeclaration> {
    let mut lists: [std::iter::Peekable<std::vec::IntoIter<MemberDeclaration>>; 3] = [
        fields
            .into_iter()
            .map(MemberDeclaration::Field)
            .collect::<Vec<_>>()
            .into_iter()
            .peekable(),
        methods
            .into_iter()
            .map(MemberDeclaration::Method)
            .collect::<Vec<_>>()
            .into_iter()
            .peekable(),
        inner_types
            .into_iter()
            .map(MemberDeclaration::Type)
            .collect::<Vec<_>>()
            .into_iter()
            .peekable(),
    ];

    let mut merged = Vec::new();
    loop {
        let heads: Vec<(usize, u32)> = lists
            .iter_mut()
            .enumerate()
            .filter_map(|(kind, list)| list.peek().map(|member| (kind, member.line())))
            .collect();
        let pick = heads
            .iter()
            .find(|(_, line)| *line == 0)
            .or_else(|| heads.iter().min_by_key(|(kind, line)| (*line, *kind)))
            .map(|(kind, _)| *kind);
        let Some(kind) = pick else {
            break;
        };
        if let Some(member) = lists[kind].next() {
            merged.push(member);
        }
    }
    merged
}

/// Groups adjacent fields declared on one line with the same modifiers and type.
///
/// A field without a line number joins the current group only when the group has a line and
/// the next field that has one is on that same line. Applying it twice changes nothing.
pub fn aggregate_fields(fields: Vec<FieldDeclaration>) -> Vec<FieldDeclaration> {
    let lines: Vec<u32> = fields.iter().map(|field| field.line).collect();
    let next_line = |from: usize| {
        lines[from..]
            .iter()
            .copied()
            .find(|line| *line != 0)
            .unwrap_or(0)
    };

    let mut groups: Vec<FieldDeclaration> = Vec::new();
    for (index, field) in fields.into_iter().enumerate() {
        if let Some(group) = groups.last_mut()
            && group.line != 0
            && group.access == field.access
            && group.ty == field.ty
            && (field.line == group.line || (field.line == 0 && next_line(index + 1) == group.line))
        {
            group.declarators.extend(field.declarators);
            continue;
        }
        groups.push(field);
    }
    groups
}
