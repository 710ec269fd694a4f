use sdata_core::{
    load, save_to_string, to_value, FullName, ProgramMetadata, SaveOptions, TypeKind, TypeMetadata,
};

fn main() {
    let mut builder = ProgramMetadata::builder();
    let user = builder.declare_class(FullName::new("urn:example:users", "User"));
    builder
        .class(user)
        .property("Name", TypeMetadata::atom(TypeKind::String, false))
        .property("Email", TypeMetadata::atom(TypeKind::String, true))
        .property(
            "Roles",
            TypeMetadata::atom_set(TypeMetadata::atom(TypeKind::String, false), false),
        );
    let program = match builder.build() {
        Ok(program) => program,
        Err(e) => {
            eprintln!("Invalid metadata: {e}");
            return;
        }
    };

    let data = r#"
        a0:User <a0 = "urn:example:users"> {
            Name = "John Doe"
            Email = "john.doe@example.com"
            Roles = ["admin", "ops"]
        }
    "#;

    match load("example.sds", data, &program, user) {
        Ok(obj) => {
            match to_value(&obj, &program).to_json() {
                Ok(json) => println!("Loaded SData as JSON:\n{json}"),
                Err(e) => eprintln!("Failed to export: {e}"),
            }
            match save_to_string(&obj, &program, user, &SaveOptions::spaces(4)) {
                Ok(text) => println!("Saved back:\n{text}"),
                Err(e) => eprintln!("Failed to save: {e}"),
            }
        }
        Err(e) => {
            eprintln!("Failed to load: {:?}", miette::Report::new(e));
        }
    }
}
