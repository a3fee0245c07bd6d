use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{json, Value};

use super::*;
use crate::test_utils::{TestList, TestPos};
use crate::{Anchor, AnchorType};

fn rich(values: &str) -> RichList<TestList<char>> {
    RichList::new(TestList::from_values(values.chars().collect()), "alice")
}

fn fmt(entries: &[(&str, Value)]) -> Format {
    entries
        .iter()
        .map(|(key, value)| (InternalString::from(*key), value.clone()))
        .collect()
}

mod format {
    use super::*;

    #[test]
    fn formats_a_slice() {
        let mut list = rich("abcdefghij");
        let (mark, changes) = list
            .format(0, 3, "bold", json!(true), None)
            .unwrap();
        assert_eq!(mark.key, InternalString::from("bold"));
        assert_eq!(mark.creator, InternalString::from("alice"));
        assert_eq!(changes.len(), 1);

        assert_eq!(
            list.formatted_slices(None).unwrap(),
            vec![
                FormattedSlice {
                    start: 0,
                    end: 3,
                    format: fmt(&[("bold", json!(true))]),
                },
                FormattedSlice {
                    start: 3,
                    end: 10,
                    format: Format::default(),
                },
            ]
        );
        assert_eq!(list.get_format_at(2).unwrap(), fmt(&[("bold", json!(true))]));
        assert_eq!(list.get_format_at(3).unwrap(), Format::default());
    }

    #[test]
    fn expanding_end_swallows_later_inserts() {
        let mut list = rich("abc");
        list.format(0, 3, "bold", json!(true), Some(Expand::After))
            .unwrap();
        list.insert_at(3, vec!['d', 'e']);
        assert_eq!(
            list.formatted_slices(None).unwrap(),
            vec![FormattedSlice {
                start: 0,
                end: 5,
                format: fmt(&[("bold", json!(true))]),
            }]
        );
    }

    #[test]
    fn bounded_end_excludes_later_inserts() {
        let mut list = rich("abc");
        list.format(0, 3, "url", json!("www"), Some(Expand::None))
            .unwrap();
        list.insert_at(3, vec!['d']);
        assert_eq!(
            list.formatted_slices(None).unwrap(),
            vec![
                FormattedSlice {
                    start: 0,
                    end: 3,
                    format: fmt(&[("url", json!("www"))]),
                },
                FormattedSlice {
                    start: 3,
                    end: 4,
                    format: Format::default(),
                },
            ]
        );
    }

    #[test]
    fn unformat_with_null() {
        let mut list = rich("abcdefghij");
        list.format(0, 8, "bold", json!(true), None).unwrap();
        let (_, changes) = list.format(2, 5, "bold", Value::Null, None).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].previous_value, Some(json!(true)));

        let slices = list.formatted_slices(None).unwrap();
        assert_eq!(slices.len(), 4);
        assert_eq!(slices[0].end, 2);
        assert_eq!(slices[0].format, fmt(&[("bold", json!(true))]));
        assert_eq!(slices[1].format, Format::default());
        assert_eq!(slices[1].end, 5);
        assert_eq!(slices[2].format, fmt(&[("bold", json!(true))]));
        assert_eq!(slices[2].end, 8);
        assert_eq!(slices[3].format, Format::default());
    }

    #[test]
    fn rejects_empty_and_out_of_range_slices() {
        let mut list = rich("abc");
        assert!(matches!(
            list.format(1, 1, "bold", json!(true), None),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            list.format(0, 4, "bold", json!(true), None),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(list.get_format_at(3), Err(Error::OutOfRange { .. })));
    }
}

mod insert_with_format {
    use super::*;

    #[test]
    fn formats_content_inserted_into_an_empty_list() {
        let mut list: RichList<TestList<char>> = RichList::new(TestList::new(), "alice");
        let marks = list
            .insert_with_format(0, &fmt(&[("bold", json!(true))]), vec!['a', 'b', 'c'])
            .unwrap();

        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].key, InternalString::from("bold"));
        assert_eq!(marks[0].start.type_, AnchorType::Before);
        assert_eq!(marks[0].start.pos, *list.list().position_at(0));
        // the default expand rule leaves the end open
        assert_eq!(marks[0].end, Anchor::max());

        assert_eq!(list.len(), 3);
        for index in 0..3 {
            assert_eq!(
                list.get_format_at(index).unwrap(),
                fmt(&[("bold", json!(true))])
            );
        }
    }

    #[test]
    fn appending_into_a_matching_region_needs_no_marks() {
        let mut list = rich("abc");
        list.format(0, 3, "bold", json!(true), Some(Expand::After))
            .unwrap();
        let marks = list
            .insert_with_format(3, &fmt(&[("bold", json!(true))]), vec!['d', 'e'])
            .unwrap();
        assert!(marks.is_empty());
        assert_eq!(list.get_format_at(4).unwrap(), fmt(&[("bold", json!(true))]));
    }

    #[test]
    fn non_expanding_keys_get_a_bounded_mark() {
        let mut list = rich("abc");
        list.set_expand_rule(|key, _value| {
            if &**key == "url" {
                Expand::None
            } else {
                Expand::After
            }
        });
        list.format(0, 3, "url", json!("www"), Some(Expand::None))
            .unwrap();

        let marks = list
            .insert_with_format(3, &fmt(&[("url", json!("www"))]), vec!['d', 'e'])
            .unwrap();
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].start, Anchor::before(*list.list().position_at(3)));
        assert_eq!(marks[0].end, Anchor::after(*list.list().position_at(4)));
        assert_eq!(list.get_format_at(4).unwrap(), fmt(&[("url", json!("www"))]));
    }

    #[test]
    fn removes_inherited_keys_the_target_lacks() {
        let mut list = rich("abc");
        list.format(0, 3, "bold", json!(true), Some(Expand::After))
            .unwrap();
        let marks = list
            .insert_with_format(3, &Format::default(), vec!['d'])
            .unwrap();
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].value, Value::Null);
        assert_eq!(list.get_format_at(3).unwrap(), Format::default());
        assert_eq!(list.get_format_at(2).unwrap(), fmt(&[("bold", json!(true))]));
    }

    #[test]
    fn empty_insert_is_a_noop() {
        let mut list = rich("abc");
        let marks = list
            .insert_with_format(1, &fmt(&[("bold", json!(true))]), vec![])
            .unwrap();
        assert!(marks.is_empty());
        assert_eq!(list.len(), 3);
    }
}

mod projection {
    use super::*;

    #[test]
    fn windowed_slices() {
        let mut list = rich("abcdefghij");
        list.format(2, 6, "bold", json!(true), None).unwrap();

        assert_eq!(
            list.formatted_slices(Some((4, 8))).unwrap(),
            vec![
                FormattedSlice {
                    start: 4,
                    end: 6,
                    format: fmt(&[("bold", json!(true))]),
                },
                FormattedSlice {
                    start: 6,
                    end: 8,
                    format: Format::default(),
                },
            ]
        );
        assert!(list.formatted_slices(Some((3, 2))).is_err());
        assert!(list.formatted_slices(Some((0, 11))).is_err());
        assert_eq!(list.formatted_slices(Some((4, 4))).unwrap(), vec![]);
    }

    #[test]
    fn entries_pair_values_with_formats() {
        let mut list = rich("abc");
        list.format(1, 2, "bold", json!(true), None).unwrap();

        let entries: Vec<(TestPos, char, Format)> = list
            .entries(None)
            .unwrap()
            .map(|(pos, value, format)| (pos, *value, format))
            .collect();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].1, 'a');
        assert_eq!(entries[0].2, Format::default());
        assert_eq!(entries[1].1, 'b');
        assert_eq!(entries[1].2, fmt(&[("bold", json!(true))]));
        assert_eq!(entries[2].1, 'c');
        assert_eq!(entries[2].2, Format::default());
        for (index, entry) in entries.iter().enumerate() {
            assert_eq!(entry.0, *list.list().position_at(index));
        }

        let windowed: Vec<char> = list
            .entries(Some((1, 3)))
            .unwrap()
            .map(|(_, value, _)| *value)
            .collect();
        assert_eq!(windowed, vec!['b', 'c']);
    }
}

mod persistence {
    use super::*;

    #[test]
    fn save_load_round_trip() {
        let mut list = rich("abcdefghij");
        list.format(0, 4, "bold", json!(true), None).unwrap();
        list.format(2, 8, "url", json!("www"), Some(Expand::None))
            .unwrap();
        let expected = list.formatted_slices(None).unwrap();

        let saved = list.save();
        let json = serde_json::to_string(&saved).unwrap();
        // recorded in order: position metadata, list, formatting
        let order = ["\"order\"", "\"list\"", "\"formatting\""];
        let mut last = 0;
        for field in order {
            let at = json.find(field).unwrap();
            assert!(at >= last);
            last = at;
        }

        let mut restored: RichList<TestList<char>> = RichList::new(TestList::new(), "bob");
        restored.load(serde_json::from_str(&json).unwrap()).unwrap();
        assert_eq!(restored.len(), 10);
        assert_eq!(restored.formatted_slices(None).unwrap(), expected);
        assert_eq!(restored.get_format_at(3).unwrap(), fmt(&[("bold", json!(true))]));

        // marks observed through load never outrank fresh ones
        let (mark, _) = restored
            .format(0, 1, "bold", Value::Null, None)
            .unwrap();
        assert_eq!(restored.get_format_at(0).unwrap(), Format::default());
        assert!(mark.timestamp > 2);
    }

    #[test]
    fn anchors_serialize_with_a_before_flag() {
        let anchor = Anchor::before(TestPos(42));
        let json = serde_json::to_value(&anchor).unwrap();
        assert_eq!(json, json!({"pos": 42, "before": true}));
        let back: Anchor<TestPos> = serde_json::from_value(json).unwrap();
        assert_eq!(back, anchor);
    }

    #[test]
    fn marks_serialize_with_creator_and_timestamp() {
        let mut list = rich("abc");
        let (mark, _) = list.format(0, 2, "bold", json!(true), None).unwrap();
        let json = serde_json::to_value(&mark).unwrap();
        assert_eq!(json["creatorID"], json!("alice"));
        assert_eq!(json["timestamp"], json!(1));
        assert_eq!(json["key"], json!("bold"));
        let back: crate::TimestampMark<TestPos> = serde_json::from_value(json).unwrap();
        assert_eq!(back, mark);
    }
}

mod hooks {
    use super::*;

    #[test]
    fn new_mark_hook_fires_after_the_state_is_updated() {
        let mut list = rich("abcdefghij");
        let seen: Rc<RefCell<Vec<InternalString>>> = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        list.set_on_new_mark(move |mark| {
            log.borrow_mut().push(mark.key.clone());
        });

        list.format(0, 3, "bold", json!(true), None).unwrap();
        list.insert_with_format(
            3,
            &fmt(&[("bold", json!(true)), ("url", json!("www"))]),
            vec!['k'],
        )
        .unwrap();

        // one mark from format(), one from insert_with_format() for the
        // missing url key (bold is inherited from the expanded mark)
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], InternalString::from("bold"));
        assert_eq!(seen[1], InternalString::from("url"));
    }
}

mod diffing {
    use super::*;

    #[test]
    fn diff_reports_additions_changes_and_deletions() {
        let current = fmt(&[("bold", json!(true)), ("url", json!("old"))]);
        let target = fmt(&[("url", json!("new")), ("italic", json!(true))]);
        let diff = diff_formats(&current, &target);
        assert_eq!(
            diff,
            fmt(&[
                ("url", json!("new")),
                ("italic", json!(true)),
                ("bold", Value::Null),
            ])
        );
    }

    #[test]
    fn diff_ignores_null_entries_on_both_sides() {
        let current = fmt(&[("bold", Value::Null)]);
        let target = fmt(&[("bold", Value::Null), ("url", json!("x"))]);
        let diff = diff_formats(&current, &target);
        assert_eq!(diff, fmt(&[("url", json!("x"))]));
        assert!(diff_formats(&Format::default(), &Format::default()).is_empty());
    }
}
