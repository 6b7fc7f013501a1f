use serde_json::Value;
use sigtest_eval::{CompiledCriteria, Record, compile_criteria, evaluate, parse_rule_yaml};

pub fn compile(doc: Value) -> CompiledCriteria {
    compile_criteria(&doc).unwrap()
}

pub fn compile_rule(yaml: &str) -> CompiledCriteria {
    parse_rule_yaml(yaml).unwrap().detection_criteria().unwrap()
}

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("record must be an object, got {other}"),
    }
}

pub fn eval(compiled: &CompiledCriteria, event: Value) -> bool {
    evaluate(&compiled.criteria, &record(event))
}
