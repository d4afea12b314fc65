//! Example of using the low-level API for nested value access.
//!
//! cargo run --package tron --example nested_access

use tron::{TypedValue, Value, arr, from_json, map};

fn main() -> Result<(), tron::Error> {
    let doc = from_json(r#"{"users": [{"name": "Amy"}, {"name": "Bob"}]}"#)?;
    let data = doc.as_bytes();

    // node = root
    let mut addr = doc.root_addr();
    let TypedValue::Map(node) = Value::new(data, addr)?.typed()? else {
        panic!()
    };

    // node = root["users"]
    addr = map::get(data, node.addr(), "users")?.unwrap();
    let TypedValue::Arr(node) = Value::new(data, addr)?.typed()? else {
        panic!()
    };

    // node = root["users"][1]
    addr = arr::get(data, node.addr(), 1)?.unwrap();
    let TypedValue::Map(node) = Value::new(data, addr)?.typed()? else {
        panic!()
    };

    // node = root["users"][1]["name"]
    addr = map::get(data, node.addr(), "name")?.unwrap();
    let TypedValue::Str(name) = Value::new(data, addr)?.typed()? else {
        panic!()
    };

    println!("{name}");
    Ok(())
}
