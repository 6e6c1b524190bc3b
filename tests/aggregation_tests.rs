//! Aggregation pipelines end-to-end, including the cross-collection
//! `$lookup` join.

use mainydb::{doc, Error, Store, Value};

fn open_store() -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    (dir, store)
}

#[test]
fn test_match_group_sum_sort() {
    let (_dir, store) = open_store();
    let coll = store.database("test_agg").collection("items").unwrap();
    coll.insert_many(vec![
        doc! { "group" => "A", "val" => 10 },
        doc! { "group" => "A", "val" => 5 },
        doc! { "group" => "B", "val" => 3 },
    ])
    .unwrap();

    let results = coll
        .aggregate(&[
            doc! { "$match" => doc! {} },
            doc! { "$group" => doc! { "_id" => "$group", "total" => doc! { "$sum" => "$val" } } },
            doc! { "$sort" => doc! { "_id" => 1 } },
        ])
        .unwrap()
        .to_vec()
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].get_str("_id"), Some("A"));
    assert_eq!(results[0].get_i64("total"), Some(15));
    assert_eq!(results[1].get_str("_id"), Some("B"));
    assert_eq!(results[1].get_i64("total"), Some(3));
}

#[test]
fn test_group_count_and_avg_by_city() {
    let (_dir, store) = open_store();
    let users = store.database("test_agg").collection("users").unwrap();
    users
        .insert_many(vec![
            doc! { "name" => "Charlie", "age" => 42, "city" => "New York" },
            doc! { "name" => "Diana", "age" => 38, "city" => "Boston" },
            doc! { "name" => "Edward", "age" => 26, "city" => "New York" },
            doc! { "name" => "George", "age" => 30, "city" => "Boston" },
        ])
        .unwrap();

    let results = users
        .aggregate(&[
            doc! { "$match" => doc! { "city" => doc! { "$exists" => true } } },
            doc! { "$group" => doc! {
                "_id" => "$city",
                "count" => doc! { "$count" => doc! {} },
                "avg_age" => doc! { "$avg" => "$age" },
            } },
            doc! { "$sort" => doc! { "count" => -1, "_id" => 1 } },
        ])
        .unwrap()
        .to_vec()
        .unwrap();

    assert_eq!(results.len(), 2);
    for row in &results {
        assert_eq!(row.get_i64("count"), Some(2));
    }
    let ny = results.iter().find(|r| r.get_str("_id") == Some("New York")).unwrap();
    assert_eq!(ny.get_f64("avg_age"), Some(34.0));
}

#[test]
fn test_unwind_group_tags() {
    let (_dir, store) = open_store();
    let products = store.database("test_agg").collection("products").unwrap();
    products
        .insert_many(vec![
            doc! { "name" => "Laptop", "tags" => vec!["computer", "portable"] },
            doc! { "name" => "Phone", "tags" => vec!["mobile", "portable"] },
            doc! { "name" => "Desk" },
        ])
        .unwrap();

    let results = products
        .aggregate(&[
            doc! { "$unwind" => "$tags" },
            doc! { "$group" => doc! {
                "_id" => "$tags",
                "count" => doc! { "$count" => doc! {} },
                "products" => doc! { "$push" => "$name" },
            } },
            doc! { "$sort" => doc! { "count" => -1, "_id" => 1 } },
        ])
        .unwrap()
        .to_vec()
        .unwrap();

    assert_eq!(results[0].get_str("_id"), Some("portable"));
    assert_eq!(results[0].get_i64("count"), Some(2));
    assert_eq!(
        results[0].get("products"),
        Some(&Value::array(["Laptop", "Phone"]))
    );
    assert_eq!(results.len(), 3);
}

#[test]
fn test_project_then_unwind_then_group_avg() {
    let (_dir, store) = open_store();
    let products = store.database("test_agg").collection("products").unwrap();
    products
        .insert_many(vec![
            doc! {
                "name" => "Laptop",
                "reviews" => vec![
                    Value::Object(doc! { "rating" => 4.0 }),
                    Value::Object(doc! { "rating" => 5.0 }),
                ],
            },
            doc! {
                "name" => "Phone",
                "reviews" => vec![
                    Value::Object(doc! { "rating" => 3.0 }),
                ],
            },
        ])
        .unwrap();

    let results = products
        .aggregate(&[
            doc! { "$project" => doc! {
                "name" => 1,
                "review_count" => doc! { "$size" => "$reviews" },
                "reviews" => 1,
            } },
            doc! { "$unwind" => "$reviews" },
            doc! { "$group" => doc! {
                "_id" => "$name",
                "avg_rating" => doc! { "$avg" => "$reviews.rating" },
                "review_count" => doc! { "$first" => "$review_count" },
            } },
            doc! { "$sort" => doc! { "avg_rating" => -1 } },
        ])
        .unwrap()
        .to_vec()
        .unwrap();

    assert_eq!(results[0].get_str("_id"), Some("Laptop"));
    assert_eq!(results[0].get_f64("avg_rating"), Some(4.5));
    assert_eq!(results[0].get_i64("review_count"), Some(2));
    assert_eq!(results[1].get_str("_id"), Some("Phone"));
    assert_eq!(results[1].get_f64("avg_rating"), Some(3.0));
}

#[test]
fn test_lookup_joins_sibling_collection() {
    let (_dir, store) = open_store();
    let db = store.database("test_agg");
    let orders = db.collection("orders").unwrap();
    let customers = db.collection("customers").unwrap();

    customers
        .insert_many(vec![
            doc! { "cid" => 1, "name" => "Ada" },
            doc! { "cid" => 2, "name" => "Bob" },
        ])
        .unwrap();
    orders
        .insert_many(vec![
            doc! { "item" => "pen", "customer" => 1 },
            doc! { "item" => "ink", "customer" => 2 },
            doc! { "item" => "pad", "customer" => 9 },
        ])
        .unwrap();

    let results = orders
        .aggregate(&[doc! { "$lookup" => doc! {
            "from" => "customers",
            "localField" => "customer",
            "foreignField" => "cid",
            "as" => "who",
        } }])
        .unwrap()
        .to_vec()
        .unwrap();

    let ada = results[0].get_array("who").unwrap();
    assert_eq!(ada.len(), 1);
    assert_eq!(
        ada[0].as_document().unwrap().get_str("name"),
        Some("Ada")
    );
    assert!(results[2].get_array("who").unwrap().is_empty());
}

#[test]
fn test_count_stage_and_cursor_chaining() {
    let (_dir, store) = open_store();
    let coll = store.database("test_agg").collection("items").unwrap();
    coll.insert_many((0..25).map(|i| doc! { "n" => i }).collect()).unwrap();

    let results = coll
        .aggregate(&[
            doc! { "$match" => doc! { "n" => doc! { "$lt" => 10 } } },
            doc! { "$count" => "small" },
        ])
        .unwrap()
        .to_vec()
        .unwrap();
    assert_eq!(results, vec![doc! { "small" => 10 }]);

    // Aggregation output is a cursor: chaining still applies
    let top = coll
        .aggregate(&[doc! { "$sort" => doc! { "n" => -1 } }])
        .unwrap()
        .limit(3)
        .to_vec()
        .unwrap();
    let ns: Vec<i64> = top.iter().filter_map(|d| d.get_i64("n")).collect();
    assert_eq!(ns, vec![24, 23, 22]);
}

#[test]
fn test_skip_limit_stages() {
    let (_dir, store) = open_store();
    let coll = store.database("test_agg").collection("items").unwrap();
    coll.insert_many((0..10).map(|i| doc! { "n" => i }).collect()).unwrap();

    let results = coll
        .aggregate(&[
            doc! { "$sort" => doc! { "n" => 1 } },
            doc! { "$skip" => 6 },
            doc! { "$limit" => 2 },
        ])
        .unwrap()
        .to_vec()
        .unwrap();
    let ns: Vec<i64> = results.iter().filter_map(|d| d.get_i64("n")).collect();
    assert_eq!(ns, vec![6, 7]);
}

#[test]
fn test_unknown_stage_and_negative_bounds_error() {
    let (_dir, store) = open_store();
    let coll = store.database("test_agg").collection("items").unwrap();
    coll.insert_one(doc! { "n" => 1 }).unwrap();

    assert!(matches!(
        coll.aggregate(&[doc! { "$frobnicate" => doc! {} }]),
        Err(Error::BadQuery(_))
    ));
    assert!(matches!(
        coll.aggregate(&[doc! { "$skip" => -2 }]),
        Err(Error::BadQuery(_))
    ));
    assert!(matches!(
        coll.aggregate(&[doc! { "$limit" => -2 }]),
        Err(Error::BadQuery(_))
    ));
}

#[test]
fn test_expression_project_pipeline() {
    let (_dir, store) = open_store();
    let coll = store.database("test_agg").collection("orders").unwrap();
    coll.insert_many(vec![
        doc! { "item" => "pen", "price" => 2.5, "qty" => 4 },
        doc! { "item" => "ink", "price" => 10.0, "qty" => 2 },
    ])
    .unwrap();

    let results = coll
        .aggregate(&[
            doc! { "$project" => doc! {
                "_id" => 0,
                "label" => doc! { "$toUpper" => "$item" },
                "total" => doc! { "$multiply" => vec![Value::from("$price"), Value::from("$qty")] },
            } },
            doc! { "$sort" => doc! { "total" => -1 } },
        ])
        .unwrap()
        .to_vec()
        .unwrap();

    assert_eq!(results[0], doc! { "label" => "INK", "total" => 20.0 });
    assert_eq!(results[1], doc! { "label" => "PEN", "total" => 10.0 });
}
