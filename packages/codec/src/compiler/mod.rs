//! The converter compiler.
//!
//! `compile` turns a `PropertySchema` into a `CompiledConverterSet`: three
//! routines made of per-prop closures, each specialized for its prop's rules
//! (which handler runs on a missing key, which on a nil, which transform on a
//! value), plus a readable listing of each routine for diagnostics.
//!
//! Compilation is pure: the same schema always yields equivalent routines
//! and the same source text.

mod source;
mod transform;

use std::sync::Arc;

use propmap_core::{Map, Value};

use crate::converters::{
    CompiledConverterSet, DeserializeFn, DeserializeRoutine, Fault, GeneratedMethod, SerializeFn,
    SerializeRoutine, Step, StepLines,
};
use crate::instance::Instance;
use crate::options::TransformMode;
use crate::schema::{PropDefault, PropRule, PropertySchema};

use source::SourceWriter;
pub(crate) use transform::Transform;

/// Compile the converter routines for `schema`.
pub fn compile(class_name: &str, schema: Arc<PropertySchema>) -> CompiledConverterSet {
    let serialize = compile_serialize(&schema);
    let deserialize_cloned = compile_deserialize(&schema, TransformMode::Clone);
    let deserialize_frozen = compile_deserialize(&schema, TransformMode::Freeze);

    CompiledConverterSet {
        class_name: class_name.to_string(),
        schema,
        serialize,
        deserialize_cloned,
        deserialize_frozen,
    }
}

fn compile_serialize(schema: &PropertySchema) -> SerializeRoutine {
    let mut src = SourceWriter::new();
    src.line(
        0,
        format!("fn {}(&self, strict: bool) -> Map {{", GeneratedMethod::Serialize),
    );
    src.line(1, "let mut h = Map::new();");

    let mut steps = Vec::with_capacity(schema.len());
    for (index, rule) in schema.rules().iter().enumerate() {
        if rule.is_store_excluded() {
            continue;
        }
        src.blank();
        steps.push(serialize_step(&mut src, index, rule));
    }

    src.blank();
    src.line(1, "h");
    src.line(0, "}");

    SerializeRoutine {
        steps,
        source: src.finish(),
    }
}

fn serialize_step(src: &mut SourceWriter, index: usize, rule: &PropRule) -> Step<SerializeFn> {
    let prop = rule.name().to_string();
    let key = rule.serialized_key().to_string();
    let transform = Transform::compile(rule.prop_type());
    let needs_value = rule.needs_value_on_serialize();

    src.line(1, format!("match &self.{} {{", prop));
    let missing = if needs_value {
        src.line(
            2,
            format!(
                "None => if strict {{ self.required_prop_missing_from_serialize({:?})?; }}",
                prop
            ),
        )
    } else {
        src.line(2, "None => {}")
    };
    let value = src.line(
        2,
        format!(
            "Some(val) => {{ h.insert({:?}.into(), {}); }}",
            key,
            transform.render_serialize("val", 0)
        ),
    );
    src.line(1, "}");

    let lines = StepLines {
        missing,
        nil: 0,
        value,
    };

    let run: SerializeFn = if needs_value {
        let name = prop.clone();
        Box::new(
            move |inst: &Instance, strict: bool, h: &mut Map| -> Result<(), Fault> {
                match inst.slot(index) {
                    Some(val) => {
                        let v = transform.serialize(val, strict).map_err(Fault::value)?;
                        h.insert(key.clone(), v);
                        Ok(())
                    }
                    None if strict => inst
                        .required_prop_missing_from_serialize(&name)
                        .map_err(Fault::missing),
                    None => Ok(()),
                }
            },
        )
    } else {
        Box::new(
            move |inst: &Instance, strict: bool, h: &mut Map| -> Result<(), Fault> {
                if let Some(val) = inst.slot(index) {
                    let v = transform.serialize(val, strict).map_err(Fault::value)?;
                    h.insert(key.clone(), v);
                }
                Ok(())
            },
        )
    };

    Step { prop, lines, run }
}

/// What a deserialize step does when its key is absent.
enum MissingHandler {
    Default(PropDefault),
    Required,
    Unset,
}

impl MissingHandler {
    fn for_rule(rule: &PropRule) -> Self {
        match rule.default() {
            Some(default) => MissingHandler::Default(default.clone()),
            None if rule.is_required() => MissingHandler::Required,
            None => MissingHandler::Unset,
        }
    }

    fn render(&self, rule: &PropRule) -> String {
        match self {
            MissingHandler::Default(default) => render_default(rule, default),
            MissingHandler::Required => format!(
                "{{ self.required_prop_missing_from_deserialize({:?}, {:?}); None }}",
                rule.name(),
                rule.serialized_key()
            ),
            MissingHandler::Unset => "None".to_string(),
        }
    }
}

/// What a deserialize step does when its key holds nil.
enum NilHandler {
    Default(PropDefault),
    RaiseNilError,
    MarkMissing,
    Unset,
}

impl NilHandler {
    fn for_rule(rule: &PropRule) -> Self {
        if !rule.is_required() {
            return NilHandler::Unset;
        }
        match rule.default() {
            Some(default) => NilHandler::Default(default.clone()),
            None if rule.raises_on_nil_write() => NilHandler::RaiseNilError,
            None => NilHandler::MarkMissing,
        }
    }

    fn render(&self, rule: &PropRule) -> String {
        match self {
            NilHandler::Default(default) => render_default(rule, default),
            NilHandler::RaiseNilError => format!(
                "self.raise_nil_deserialize_error({:?}, {:?})?",
                rule.name(),
                rule.serialized_key()
            ),
            NilHandler::MarkMissing => format!(
                "{{ self.mark_missing_from_deserialize({:?}); None }}",
                rule.name()
            ),
            NilHandler::Unset => "None".to_string(),
        }
    }
}

fn render_default(rule: &PropRule, default: &PropDefault) -> String {
    match default {
        PropDefault::Value(v) => format!("Some({:?}.into())", v),
        PropDefault::Factory(_) => format!("Some(Self::{}_factory())", rule.name()),
    }
}

fn compile_deserialize(schema: &PropertySchema, mode: TransformMode) -> DeserializeRoutine {
    let method = GeneratedMethod::for_mode(mode);
    let mut src = SourceWriter::new();
    src.line(0, format!("fn {}(&mut self, hash: &Map) -> usize {{", method));
    src.line(1, "let mut found = 0;");

    let mut steps = Vec::with_capacity(schema.len());
    for (index, rule) in schema.rules().iter().enumerate() {
        // Store-excluded props keep whatever value they hold in memory.
        if rule.is_store_excluded() {
            continue;
        }
        src.blank();
        steps.push(deserialize_step(&mut src, index, rule, mode));
    }

    src.blank();
    src.line(1, "found");
    src.line(0, "}");

    DeserializeRoutine {
        method,
        steps,
        source: src.finish(),
    }
}

fn deserialize_step(
    src: &mut SourceWriter,
    index: usize,
    rule: &PropRule,
    mode: TransformMode,
) -> Step<DeserializeFn> {
    let prop = rule.name().to_string();
    let key = rule.serialized_key().to_string();
    let transform = Transform::compile(rule.prop_type());
    let on_missing = MissingHandler::for_rule(rule);
    let on_nil = NilHandler::for_rule(rule);

    src.line(1, format!("self.{} = match hash.get({:?}) {{", prop, key));
    let missing = src.line(2, format!("None => {},", on_missing.render(rule)));
    let nil = src.line(
        2,
        format!(
            "Some(Value::Null) => {{ found += 1; {} }}",
            on_nil.render(rule)
        ),
    );
    let value = src.line(
        2,
        format!(
            "Some(val) => {{ found += 1; Some({}) }}",
            transform.render_deserialize("val", mode, 0)
        ),
    );
    src.line(1, "};");

    let lines = StepLines {
        missing,
        nil,
        value,
    };

    let name = prop.clone();
    let run: DeserializeFn = Box::new(
        move |inst: &mut Instance, hash: &Map| -> Result<bool, Fault> {
            match hash.get(&key) {
                None => {
                    let v = match &on_missing {
                        MissingHandler::Default(default) => Some(default.produce()),
                        MissingHandler::Required => {
                            inst.assign(index, None);
                            let err = inst.required_prop_missing_from_deserialize(&name, &key);
                            return Err(Fault::deferred_missing(err));
                        }
                        MissingHandler::Unset => None,
                    };
                    inst.assign(index, v);
                    Ok(false)
                }
                Some(Value::Null) => {
                    let v = match &on_nil {
                        NilHandler::Default(default) => Some(default.produce()),
                        NilHandler::RaiseNilError => {
                            let class = inst.class().clone();
                            let err = class.raise_nil_deserialize_error(inst, &name, &key);
                            return Err(Fault::nil(err));
                        }
                        NilHandler::MarkMissing => {
                            inst.mark_missing_from_deserialize(&name);
                            None
                        }
                        NilHandler::Unset => None,
                    };
                    inst.assign(index, v);
                    Ok(true)
                }
                Some(raw) => {
                    let v = transform.deserialize(raw, mode).map_err(Fault::value)?;
                    inst.assign(index, Some(v));
                    Ok(true)
                }
            }
        },
    );

    Step { prop, lines, run }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::PropsClass;
    use crate::schema::PropType;

    fn widget_schema() -> Arc<PropertySchema> {
        let class = PropsClass::builder("Widget")
            .prop(PropRule::new("id").serialized_as("_id").required())
            .prop(PropRule::new("name").required().raise_on_nil_write())
            .prop(PropRule::new("tags").default_value(Value::array()))
            .prop(PropRule::new("cache").dont_store())
            .build()
            .unwrap();
        class.schema()
    }

    #[test]
    fn empty_schema_compiles_to_noops() {
        let set = compile("Empty", Arc::new(PropertySchema::new()));
        let class = PropsClass::builder("Empty").build().unwrap();
        let mut inst = class.allocate();

        assert!(set.serializer().run(&inst, true).unwrap().is_empty());
        let input = Map::from([("x".to_string(), Value::Integer(1))]);
        let outcome = set
            .deserializer(TransformMode::Clone)
            .run(&mut inst, &input)
            .unwrap();
        assert_eq!(outcome.found, 0);
        assert!(outcome.deferred.is_none());
    }

    #[test]
    fn missing_required_key_does_not_stop_later_steps() {
        let class = PropsClass::builder("Account")
            .prop(PropRule::new("email").required())
            .prop(PropRule::new("phone").required())
            .prop(PropRule::new("name"))
            .build()
            .unwrap();
        let set = compile("Account", class.schema());
        let mut inst = class.allocate();
        inst.set("email", "stale@example.com").unwrap();

        let input = Map::from([("name".to_string(), Value::from("ann"))]);
        let outcome = set
            .deserializer(TransformMode::Clone)
            .run(&mut inst, &input)
            .unwrap();

        assert_eq!(outcome.found, 1);
        assert_eq!(inst.value("name"), Some(&Value::from("ann")));
        assert_eq!(inst.get("email").unwrap(), None);
        assert_eq!(
            inst.missing_required_props().collect::<Vec<_>>(),
            vec!["email", "phone"]
        );

        let failure = outcome.deferred.unwrap();
        assert_eq!(failure.prop, "email");
        assert_eq!(failure.method, GeneratedMethod::DeserializeCloned);
        assert!(matches!(
            failure.error,
            propmap_core::Error::RequiredPropMissingOnDeserialize { .. }
        ));
    }

    #[test]
    fn store_excluded_props_get_no_steps() {
        let set = compile("Widget", widget_schema());
        assert_eq!(set.serialize.steps.len(), 3);
        assert_eq!(set.deserialize_cloned.steps.len(), 3);
        assert!(!set.source(GeneratedMethod::Serialize).contains("cache"));
    }

    #[test]
    fn compilation_is_deterministic() {
        let schema = widget_schema();
        let a = compile("Widget", schema.clone());
        let b = compile("Widget", schema);
        for method in GeneratedMethod::ALL {
            assert_eq!(a.source(method), b.source(method));
        }
    }

    #[test]
    fn serialize_source_lists_props_in_order() {
        let set = compile("Widget", widget_schema());
        let expected = r#"fn generated_serialize(&self, strict: bool) -> Map {
    let mut h = Map::new();

    match &self.id {
        None => if strict { self.required_prop_missing_from_serialize("id")?; }
        Some(val) => { h.insert("_id".into(), val.clone()); }
    }

    match &self.name {
        None => if strict { self.required_prop_missing_from_serialize("name")?; }
        Some(val) => { h.insert("name".into(), val.clone()); }
    }

    match &self.tags {
        None => {}
        Some(val) => { h.insert("tags".into(), val.clone()); }
    }

    h
}"#;
        assert_eq!(set.source(GeneratedMethod::Serialize), expected);
    }

    #[test]
    fn deserialize_source_shows_handlers() {
        let set = compile("Widget", widget_schema());
        let source = set.source(GeneratedMethod::DeserializeFrozen);

        assert!(source.starts_with("fn generated_deserialize_frozen(&mut self, hash: &Map) -> usize {"));
        assert!(source.contains(
            r#"None => { self.required_prop_missing_from_deserialize("id", "_id"); None },"#
        ));
        assert!(source.contains(
            r#"Some(Value::Null) => { found += 1; self.raise_nil_deserialize_error("name", "name")? }"#
        ));
        assert!(source.contains(
            r#"Some(Value::Null) => { found += 1; { self.mark_missing_from_deserialize("id"); None } }"#
        ));
        assert!(source.contains("None => Some([].into()),"));
    }

    #[test]
    fn step_lines_point_into_source() {
        let set = compile("Widget", widget_schema());
        let source = set.source(GeneratedMethod::DeserializeCloned);
        let lines: Vec<&str> = source.split('\n').collect();

        for step in &set.deserialize_cloned.steps {
            assert!(lines[step.lines.missing - 1].trim_start().starts_with("None =>"));
            assert!(lines[step.lines.nil - 1].contains("Some(Value::Null)"));
            assert!(lines[step.lines.value - 1].contains("Some(val)"));
        }
    }

    #[test]
    fn nested_struct_renders_class_name() {
        let part = PropsClass::builder("Part")
            .prop(PropRule::new("sku"))
            .build()
            .unwrap();
        let class = PropsClass::builder("Assembly")
            .prop(PropRule::new("main").typed(PropType::Struct(part)))
            .build()
            .unwrap();
        let set = compile("Assembly", class.schema());

        assert!(set
            .source(GeneratedMethod::DeserializeCloned)
            .contains("Part::from_hash(val, TransformMode::Clone)?"));
        assert!(set
            .source(GeneratedMethod::Serialize)
            .contains("val.serialize(strict)?"));
    }
}
