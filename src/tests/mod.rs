#[cfg(test)]
mod tests {
    use crate::config::DirConfig;
    use crate::descriptor::{class_path, from_dotted, to_dotted};
    use crate::dir::SmaliDir;
    use crate::error::ErrorKind;
    use crate::instruction::Instruction;
    use crate::unit::Unit;
    use crate::walk::find_smali_files;
    use std::fs;
    use std::path::{Path, PathBuf};

    const CONFIG: &str = "tests/fixtures/Config.smali";

    fn config_unit() -> Unit {
        Unit::read_from_file(Path::new(CONFIG)).unwrap()
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let original = fs::read_to_string(CONFIG).unwrap();
        let mut u = config_unit();
        assert_eq!(u.path(), Some(Path::new(CONFIG)));
        assert_eq!(u.to_smali().unwrap(), original);
        // nothing pending, nothing changes
        assert_eq!(u.flush().unwrap(), original);
        assert!(!u.is_modified());
    }

    #[test]
    fn fixture_model() {
        let u = config_unit();
        assert_eq!(u.class(), "Lcom/example/Config;");
        assert_eq!(u.java_name(), "com.example.Config");
        let names: Vec<&str> = u.fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["arr", "TAG", "z", "name", "retries"]);
        assert_eq!(u.get_field("TAG:Ljava/lang/String;").unwrap().value(), Some("Config"));

        let sigs: Vec<String> = u.methods().iter().map(|m| m.name_signature()).collect();
        assert_eq!(
            sigs,
            vec![
                "<clinit>()V",
                "<init>(Ljava/lang/String;)V",
                "getName()Ljava/lang/String;",
                "reset()V",
                "retry(I)Z",
                "retry(J[Ljava/lang/String;)Z",
            ]
        );
        for m in u.methods() {
            let sig = m.signature();
            assert_eq!(format!("({}){}", m.params().concat(), m.return_type()), sig);
            assert!(!m.body().contains(".end method"));
        }
    }

    #[test]
    fn set_value_strips_runtime_assignments() {
        let mut u = config_unit();
        let reference = "Lcom/example/Config;->z:Ljava/lang/String;";
        u.get_field_mut(reference).unwrap().set_value("Action");
        let text = u.flush().unwrap().to_string();

        assert_eq!(text.matches(".field private static z:Ljava/lang/String; = \"Action\"").count(), 1);
        assert!(!text.contains(".field private static z:Ljava/lang/String;\n"));
        assert!(!text.contains(&format!("sput-object v0, {}", reference)));
        for m in u.methods() {
            assert!(!m.instructions().any(|i| i.assigns(reference)), "{}", m);
        }
        // the loads stay
        assert!(u.get_method("reset()V").unwrap().body().contains("const-string v0, \"été\\n\""));

        // nothing else moved
        let expected = fs::read_to_string(CONFIG)
            .unwrap()
            .replace(".field private static z:Ljava/lang/String;", ".field private static z:Ljava/lang/String; = \"Action\"")
            .replace(&format!("    sput-object v0, {}\n", reference), "");
        assert_eq!(text, expected);
    }

    #[test]
    fn string_array_goes_into_static_initializer() {
        let mut u = config_unit();
        u.get_field_mut("arr:[Ljava/lang/String;")
            .unwrap()
            .set_string_array(&["x", "y", "naïve \"quoted\""])
            .unwrap();
        u.flush().unwrap();

        let clinit = u.get_method("<clinit>()V").unwrap();
        let ins: Vec<Instruction> = clinit.instructions().collect();
        let strings: Vec<&str> = ins
            .iter()
            .filter_map(|i| match i {
                Instruction::ConstString { register, value } if register == "v2" => Some(value.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(strings, vec!["x", "y", "naïve \"quoted\""]);
        assert_eq!(ins.iter().filter(|i| matches!(i, Instruction::Other(o) if o.starts_with("aput-object"))).count(), 3);

        let body = clinit.body();
        assert!(body.starts_with("    .locals 3\n"));
        assert!(body.contains("const-string v2, \"na\\u00efve \\\"quoted\\\"\""));
        let sput = body.find("sput-object v0, Lcom/example/Config;->arr:[Ljava/lang/String;").unwrap();
        assert!(sput < body.find("    return-void").unwrap());
        // the declaration itself is left alone
        assert!(u.contains("\n.field private static arr:[Ljava/lang/String;\n"));
    }

    #[test]
    fn string_array_needs_static_initializer() {
        let text = fs::read_to_string(CONFIG).unwrap().replace("<clinit>()V", "init()V");
        let mut u = Unit::from_smali(&text).unwrap();
        u.get_field_mut("arr:[Ljava/lang/String;").unwrap().set_string_array(&["x"]).unwrap();
        let e = u.flush().unwrap_err();
        assert_eq!(e.kind(), ErrorKind::NoStaticInitializer);
        assert_eq!(u.text(), text);
    }

    #[test]
    fn field_and_method_edits_in_one_flush() {
        let mut u = config_unit();
        u.get_field_mut("retries:I").unwrap().set_final(true);
        u.get_method_mut("retry(J[Ljava/lang/String;)Z")
            .unwrap()
            .set_body("    .locals 1\n\n    const/4 v0, 0x1\n\n    return v0\n");
        let text = u.flush().unwrap().to_string();
        assert!(text.contains("\n.field private final retries:I\n"));
        assert!(text.ends_with(".method public retry(J[Ljava/lang/String;)Z\n    .locals 1\n\n    const/4 v0, 0x1\n\n    return v0\n.end method\n"));
        // the other overload is untouched
        assert!(u.get_method("retry(I)Z").unwrap().body().contains(":cond_0"));
    }

    #[test]
    fn descriptor_forms() {
        assert_eq!(to_dotted("Lcom/example/Config;").unwrap(), "com.example.Config");
        assert_eq!(from_dotted("com.example.Config"), "Lcom/example/Config;");
        assert_eq!(to_dotted("com.example.Config").unwrap_err().kind(), ErrorKind::NotAClassDescriptor);
        assert_eq!(
            class_path("Lcom/example/app/gen/R$layout;", "smali").unwrap(),
            PathBuf::from("com/example/app/gen/R$layout.smali")
        );
    }

    #[test]
    fn walker_filters() {
        let root = Path::new("tests/smali");
        let all = find_smali_files(&DirConfig::new(root)).unwrap();
        assert_eq!(
            all,
            vec![
                root.join("android/support/Compat.smali"),
                root.join("com/example/app/Broken.smali"),
                root.join("com/example/app/Main.smali"),
                root.join("com/example/app/gen/R$layout.smali"),
            ]
        );

        let some = find_smali_files(&DirConfig::new(root).include(&["com.example"]).exclude(&["app/gen"])).unwrap();
        assert_eq!(some, vec![root.join("com/example/app/Broken.smali"), root.join("com/example/app/Main.smali")]);
    }

    #[test]
    fn open_reports_broken_units() {
        let d = SmaliDir::open(DirConfig::new("tests/smali").exclude(&["android"])).unwrap();
        assert_eq!(d.len(), 2);
        assert_eq!(d.failures().len(), 1);
        assert_eq!(d.failures()[0].path, Path::new("tests/smali/com/example/app/Broken.smali"));
        assert_eq!(d.failures()[0].error.kind(), ErrorKind::UnterminatedMethod);

        let classes: Vec<&str> = d.iter().map(|u| u.class()).collect();
        assert_eq!(classes, vec!["Lcom/example/app/Main;", "Lcom/example/app/gen/R$layout;"]);
        assert_eq!(d.xref("Lcom/example/app/gen/R$layout;->main:I").len(), 1);
        assert_eq!(d.get_field("Lcom/example/app/gen/R$layout;->main:I").unwrap().value(), Some("0x7f030000"));
    }

    #[test]
    fn open_fails_on_missing_root() {
        let e = SmaliDir::open(DirConfig::new("tests/no-such-dir")).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Io);
    }

    fn class_rename_sources() -> Vec<(PathBuf, String)> {
        let a = ".class public Lcom/a/A;
.super Ljava/lang/Object;


.method public static m()V
    .locals 0

    return-void
.end method
";
        let b = ".class public Lcom/a/B;
.super Ljava/lang/Object;


.method public run()V
    .locals 0

    invoke-static {}, Lcom/a/A;->m()V

    return-void
.end method
";
        vec![
            (PathBuf::from("com/a/A.smali"), a.to_string()),
            (PathBuf::from("com/a/B.smali"), b.to_string()),
        ]
    }

    #[test]
    fn class_rename_propagates() {
        let mut d = SmaliDir::from_sources(DirConfig::default(), class_rename_sources());
        let report = d.rename("Lcom/a/A;", "Lcom/a/C;").unwrap();
        assert_eq!(report.rewritten, vec!["Lcom/a/C;", "Lcom/a/B;"]);
        assert_eq!(report.relocated, vec![PathBuf::from("com/a/C.smali")]);
        assert!(report.failures.is_empty());

        let c = &d[0];
        assert_eq!(c.class(), "Lcom/a/C;");
        assert_eq!(c.path(), Some(Path::new("com/a/C.smali")));
        assert_eq!(c.methods()[0].reference(), "Lcom/a/C;->m()V");
        assert!(d[1].contains("invoke-static {}, Lcom/a/C;->m()V"));
        assert!(d.xref("Lcom/a/A;").is_empty());
    }

    #[test]
    fn method_rename_is_anchored() {
        let mut sources = class_rename_sources();
        sources[0].1 = sources[0].1.replace(
            ".end method\n",
            ".end method\n\n.method public static mm()V\n    .locals 0\n\n    return-void\n.end method\n",
        );
        let mut d = SmaliDir::from_sources(DirConfig::default(), sources);
        d.rename("Lcom/a/A;->m()V", "Lcom/a/A;->start()V").unwrap();

        let a = d.get_unit("Lcom/a/A;").unwrap();
        assert!(a.get_method("start()V").is_some());
        assert!(a.get_method("mm()V").is_some());
        assert!(a.get_method("m()V").is_none());
        assert!(d.get_unit("Lcom/a/B;").unwrap().contains("Lcom/a/A;->start()V"));
    }

    #[test]
    fn rename_reports_units_that_cannot_flush() {
        let mut sources = class_rename_sources();
        sources[1].1 = sources[1].1.replace(
            ".super Ljava/lang/Object;\n",
            ".super Ljava/lang/Object;\n\n.field private static names:[Ljava/lang/String;\n",
        );
        let mut d = SmaliDir::from_sources(DirConfig::default(), sources);
        // B has no <clinit>() to build the array in
        d.get_field_mut("Lcom/a/B;->names:[Ljava/lang/String;")
            .unwrap()
            .set_string_array(&["x"])
            .unwrap();

        let report = d.rename("Lcom/a/A;", "Lcom/a/C;").unwrap();
        assert_eq!(report.rewritten, vec!["Lcom/a/C;"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, PathBuf::from("com/a/B.smali"));
        assert_eq!(report.failures[0].error.kind(), ErrorKind::NoStaticInitializer);
        assert!(d[1].contains("Lcom/a/A;->m()V"));
    }

    #[test]
    fn save_moves_renamed_classes() {
        let root = std::env::temp_dir().join(format!("smafile-save-{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        for (path, text) in class_rename_sources() {
            let path = root.join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, text).unwrap();
        }

        let mut d = SmaliDir::open(DirConfig::new(&root)).unwrap();
        assert_eq!(d.len(), 2);
        d.rename("Lcom/a/A;", "Lcom/a/C;").unwrap();
        assert_eq!(d.save().unwrap(), 2);

        assert!(!root.join("com/a/A.smali").exists());
        let c = fs::read_to_string(root.join("com/a/C.smali")).unwrap();
        assert!(c.starts_with(".class public Lcom/a/C;\n"));
        let b = fs::read_to_string(root.join("com/a/B.smali")).unwrap();
        assert!(b.contains("Lcom/a/C;->m()V"));

        // everything is on disk, a second save writes nothing
        assert_eq!(d.save().unwrap(), 0);
        let reloaded = SmaliDir::open(DirConfig::new(&root)).unwrap();
        assert!(reloaded.get_unit("Lcom/a/C;").is_some());
        let _ = fs::remove_dir_all(&root);
    }
}
