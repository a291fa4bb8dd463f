use super::{ClassModel, ConstValue};
use crate::types::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};

const PUBLIC: MethodAccessFlags = MethodAccessFlags::PUBLIC;
const STATIC: MethodAccessFlags = MethodAccessFlags::PUBLIC.union(MethodAccessFlags::STATIC);
const STATIC_FIELD: FieldAccessFlags = FieldAccessFlags::PUBLIC
    .union(FieldAccessFlags::STATIC)
    .union(FieldAccessFlags::FINAL);

fn with_methods(mut model: ClassModel, access: MethodAccessFlags, methods: &[(&str, &str)]) -> ClassModel {
    for (name, descriptor) in methods {
        model = model.with_method(name, descriptor, access);
    }
    model
}

fn final_class(name: &str) -> ClassModel {
    let mut model = ClassModel::new(name);
    model.access |= ClassAccessFlags::FINAL;
    model
}

fn abstract_class(name: &str) -> ClassModel {
    let mut model = ClassModel::new(name);
    model.access |= ClassAccessFlags::ABSTRACT;
    model
}

/// A boxed primitive wrapper: `valueOf`, the unboxing method and `toString`.
fn wrapper(name: &str, prim: &str, unbox: &str) -> ClassModel {
    let base = final_class(name).extends(if prim == "Z" || prim == "C" {
        "java/lang/Object"
    } else {
        "java/lang/Number"
    });
    let boxed = format!("L{};", name);
    let model = with_methods(
        base,
        PUBLIC,
        &[
            ("<init>", &format!("({})V", prim)),
            (unbox, &format!("(){}", prim)),
            ("toString", "()Ljava/lang/String;"),
            ("equals", "(Ljava/lang/Object;)Z"),
            ("hashCode", "()I"),
        ],
    );
    with_methods(
        model,
        STATIC,
        &[
            ("valueOf", &format!("({}){}", prim, boxed)),
            ("toString", &format!("({})Ljava/lang/String;", prim)),
        ],
    )
    .with_field("TYPE", "Ljava/lang/Class;", STATIC_FIELD)
}

pub(super) fn classes() -> Vec<ClassModel> {
    let mut object = with_methods(
        ClassModel::new("java/lang/Object"),
        PUBLIC,
        &[
            ("<init>", "()V"),
            ("toString", "()Ljava/lang/String;"),
            ("equals", "(Ljava/lang/Object;)Z"),
            ("hashCode", "()I"),
            ("getClass", "()Ljava/lang/Class;"),
            ("notify", "()V"),
            ("wait", "()V"),
        ],
    );
    object.super_name = None;

    let string = with_methods(
        final_class("java/lang/String").implements("java/lang/CharSequence"),
        PUBLIC,
        &[
            ("<init>", "()V"),
            ("<init>", "(Ljava/lang/String;)V"),
            ("<init>", "([C)V"),
            ("length", "()I"),
            ("charAt", "(I)C"),
            ("isEmpty", "()Z"),
            ("equals", "(Ljava/lang/Object;)Z"),
            ("hashCode", "()I"),
            ("concat", "(Ljava/lang/String;)Ljava/lang/String;"),
            ("substring", "(I)Ljava/lang/String;"),
            ("substring", "(II)Ljava/lang/String;"),
            ("indexOf", "(Ljava/lang/String;)I"),
            ("indexOf", "(I)I"),
            ("startsWith", "(Ljava/lang/String;)Z"),
            ("trim", "()Ljava/lang/String;"),
            ("toUpperCase", "()Ljava/lang/String;"),
            ("toLowerCase", "()Ljava/lang/String;"),
            ("toCharArray", "()[C"),
            ("toString", "()Ljava/lang/String;"),
        ],
    );
    let string = with_methods(
        string,
        STATIC,
        &[
            ("valueOf", "(Ljava/lang/Object;)Ljava/lang/String;"),
            ("valueOf", "(Z)Ljava/lang/String;"),
            ("valueOf", "(C)Ljava/lang/String;"),
            ("valueOf", "(I)Ljava/lang/String;"),
            ("valueOf", "(J)Ljava/lang/String;"),
            ("valueOf", "(F)Ljava/lang/String;"),
            ("valueOf", "(D)Ljava/lang/String;"),
        ],
    );

    let builder = with_methods(
        final_class("java/lang/StringBuilder").implements("java/lang/CharSequence"),
        PUBLIC,
        &[
            ("<init>", "()V"),
            ("<init>", "(Ljava/lang/String;)V"),
            ("append", "(Ljava/lang/String;)Ljava/lang/StringBuilder;"),
            ("append", "(Ljava/lang/Object;)Ljava/lang/StringBuilder;"),
            ("append", "(Z)Ljava/lang/StringBuilder;"),
            ("append", "(C)Ljava/lang/StringBuilder;"),
            ("append", "(I)Ljava/lang/StringBuilder;"),
            ("append", "(J)Ljava/lang/StringBuilder;"),
            ("append", "(F)Ljava/lang/StringBuilder;"),
            ("append", "(D)Ljava/lang/StringBuilder;"),
            ("length", "()I"),
            ("charAt", "(I)C"),
            ("toString", "()Ljava/lang/String;"),
        ],
    );

    let char_sequence = with_methods(
        ClassModel::interface("java/lang/CharSequence"),
        PUBLIC | MethodAccessFlags::ABSTRACT,
        &[("length", "()I"), ("charAt", "(I)C"), ("toString", "()Ljava/lang/String;")],
    );
    let runnable = with_methods(
        ClassModel::interface("java/lang/Runnable"),
        PUBLIC | MethodAccessFlags::ABSTRACT,
        &[("run", "()V")],
    );

    let number = with_methods(
        abstract_class("java/lang/Number"),
        PUBLIC,
        &[
            ("<init>", "()V"),
            ("intValue", "()I"),
            ("longValue", "()J"),
            ("floatValue", "()F"),
            ("doubleValue", "()D"),
        ],
    );

    let integer = with_methods(
        wrapper("java/lang/Integer", "I", "intValue"),
        STATIC,
        &[
            ("parseInt", "(Ljava/lang/String;)I"),
            ("max", "(II)I"),
            ("min", "(II)I"),
        ],
    )
    .with_constant("MAX_VALUE", "I", ConstValue::Int(i32::MAX))
    .with_constant("MIN_VALUE", "I", ConstValue::Int(i32::MIN));
    let long = with_methods(
        wrapper("java/lang/Long", "J", "longValue"),
        STATIC,
        &[("parseLong", "(Ljava/lang/String;)J")],
    )
    .with_constant("MAX_VALUE", "J", ConstValue::Long(i64::MAX))
    .with_constant("MIN_VALUE", "J", ConstValue::Long(i64::MIN));
    let boolean = wrapper("java/lang/Boolean", "Z", "booleanValue")
        .with_field("TRUE", "Ljava/lang/Boolean;", STATIC_FIELD)
        .with_field("FALSE", "Ljava/lang/Boolean;", STATIC_FIELD);
    let double = wrapper("java/lang/Double", "D", "doubleValue")
        .with_constant("MAX_VALUE", "D", ConstValue::Double(f64::MAX));

    let math = with_methods(
        final_class("java/lang/Math"),
        STATIC,
        &[
            ("abs", "(I)I"),
            ("abs", "(J)J"),
            ("abs", "(F)F"),
            ("abs", "(D)D"),
            ("max", "(II)I"),
            ("max", "(JJ)J"),
            ("max", "(DD)D"),
            ("min", "(II)I"),
            ("min", "(JJ)J"),
            ("min", "(DD)D"),
            ("sqrt", "(D)D"),
            ("pow", "(DD)D"),
            ("floor", "(D)D"),
            ("random", "()D"),
        ],
    )
    .with_constant("PI", "D", ConstValue::Double(std::f64::consts::PI))
    .with_constant("E", "D", ConstValue::Double(std::f64::consts::E));

    let system = with_methods(
        final_class("java/lang/System"),
        STATIC,
        &[
            ("currentTimeMillis", "()J"),
            ("nanoTime", "()J"),
            ("arraycopy", "(Ljava/lang/Object;ILjava/lang/Object;II)V"),
            ("getProperty", "(Ljava/lang/String;)Ljava/lang/String;"),
            ("identityHashCode", "(Ljava/lang/Object;)I"),
        ],
    )
    .with_field("out", "Ljava/io/PrintStream;", STATIC_FIELD)
    .with_field("err", "Ljava/io/PrintStream;", STATIC_FIELD);

    let mut print_stream = ClassModel::new("java/io/PrintStream");
    for name in ["print", "println"] {
        for arg in ["Z", "C", "I", "J", "F", "D", "Ljava/lang/String;", "Ljava/lang/Object;", "[C"] {
            print_stream = print_stream.with_method(name, &format!("({})V", arg), PUBLIC);
        }
    }
    let print_stream = print_stream.with_method("println", "()V", PUBLIC);

    let class = with_methods(
        final_class("java/lang/Class"),
        PUBLIC,
        &[
            ("getName", "()Ljava/lang/String;"),
            ("getSimpleName", "()Ljava/lang/String;"),
            ("isInstance", "(Ljava/lang/Object;)Z"),
        ],
    )
    .with_method("forName", "(Ljava/lang/String;)Ljava/lang/Class;", STATIC);

    let throwable = with_methods(
        ClassModel::new("java/lang/Throwable"),
        PUBLIC,
        &[
            ("<init>", "()V"),
            ("<init>", "(Ljava/lang/String;)V"),
            ("getMessage", "()Ljava/lang/String;"),
            ("printStackTrace", "()V"),
        ],
    );
    let exception = |name: &str, parent: &str| {
        with_methods(
            ClassModel::new(name).extends(parent),
            PUBLIC,
            &[("<init>", "()V"), ("<init>", "(Ljava/lang/String;)V")],
        )
    };

    let list = with_methods(
        ClassModel::interface("java/util/List"),
        PUBLIC | MethodAccessFlags::ABSTRACT,
        &[
            ("size", "()I"),
            ("get", "(I)Ljava/lang/Object;"),
            ("add", "(Ljava/lang/Object;)Z"),
            ("isEmpty", "()Z"),
        ],
    );
    let array_list = with_methods(
        ClassModel::new("java/util/ArrayList").implements("java/util/List"),
        PUBLIC,
        &[
            ("<init>", "()V"),
            ("<init>", "(I)V"),
            ("size", "()I"),
            ("get", "(I)Ljava/lang/Object;"),
            ("add", "(Ljava/lang/Object;)Z"),
            ("isEmpty", "()Z"),
        ],
    );

    vec![
        object,
        string,
        builder,
        char_sequence,
        runnable,
        number,
        integer,
        long,
        wrapper("java/lang/Short", "S", "shortValue"),
        wrapper("java/lang/Byte", "B", "byteValue"),
        wrapper("java/lang/Character", "C", "charValue"),
        boolean,
        wrapper("java/lang/Float", "F", "floatValue"),
        double,
        math,
        system,
        print_stream,
        class,
        throwable,
        exception("java/lang/Exception", "java/lang/Throwable"),
        exception("java/lang/Error", "java/lang/Throwable"),
        exception("java/lang/RuntimeException", "java/lang/Exception"),
        exception("java/lang/ArithmeticException", "java/lang/RuntimeException"),
        exception("java/lang/IllegalArgumentException", "java/lang/RuntimeException"),
        exception("java/lang/IllegalStateException", "java/lang/RuntimeException"),
        exception("java/lang/NullPointerException", "java/lang/RuntimeException"),
        exception("java/lang/ClassCastException", "java/lang/RuntimeException"),
        exception("java/io/IOException", "java/lang/Exception"),
        list,
        array_list,
    ]
}
