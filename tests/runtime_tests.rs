//! End-to-end tests: bytes in, results or traps out.

#[cfg(test)]
mod tests {
    use kwasm::encoder::ModuleBuilder;
    use kwasm::parser::decode;
    use kwasm::parser::instruction::{InstructionKind, MemArg};
    use kwasm::parser::module::{
        ExternalKind, FunctionType, GlobalType, Limits, MemoryType, RefType, TableType, ValueType,
    };
    use kwasm::parser::validate::{compile, ValidatedModule};
    use kwasm::runtime::{
        Extern, ImportObject, InstanceAddr, LinkError, RuntimeError, Segment, Store, Trap, TrapKind, Value,
    };
    use kwasm::Error;
    use rstest::rstest;

    /// `(func (export "add") (param i32 i32) (result i32) local.get 0 local.get 1 i32.add)`
    const ADD_MODULE: &[u8] = &[
        0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
        0x01, 0x07, 0x01, 0x60, 0x02, 0x7f, 0x7f, 0x01, 0x7f, // type
        0x03, 0x02, 0x01, 0x00, // function
        0x07, 0x07, 0x01, 0x03, 0x61, 0x64, 0x64, 0x00, 0x00, // export
        0x0a, 0x09, 0x01, 0x07, 0x00, 0x20, 0x00, 0x20, 0x01, 0x6a, 0x0b, // code
    ];

    fn instantiate(bytes: &[u8], imports: &ImportObject) -> Result<(Store, InstanceAddr), Error> {
        let module = compile(decode(bytes)?)?;
        let mut store = Store::new();
        let instance = store.instantiate(module, imports)?;
        Ok((store, instance))
    }

    fn validated(builder: ModuleBuilder) -> ValidatedModule {
        compile(builder.build()).unwrap_or_else(|e| panic!("module should validate: {e}"))
    }

    fn memarg(offset: u32) -> MemArg {
        MemArg { align: 2, offset }
    }

    #[rstest]
    #[case(2, 3, 5)]
    #[case(i32::MAX, 1, i32::MIN)]
    #[case(-1, -1, -2)]
    fn add_from_bytes(#[case] a: i32, #[case] b: i32, #[case] expected: i32) {
        let (store, instance) = instantiate(ADD_MODULE, &ImportObject::new()).unwrap();
        let results = store
            .invoke_export(instance, "add", &[Value::I32(a), Value::I32(b)])
            .unwrap();
        assert_eq!(results, vec![Value::I32(expected)]);
    }

    #[test]
    fn add_rejects_wrong_arguments() {
        let (store, instance) = instantiate(ADD_MODULE, &ImportObject::new()).unwrap();
        let err = store
            .invoke_export(instance, "add", &[Value::I32(1), Value::I64(2)])
            .unwrap_err();
        assert!(matches!(err, RuntimeError::ArgumentMismatch { .. }), "{err}");
        assert!(matches!(
            store.invoke_export(instance, "sub", &[]),
            Err(RuntimeError::UnknownExport(_))
        ));
    }

    #[rstest]
    #[case(i32::MIN, -1, TrapKind::IntegerOverflow)]
    #[case(7, 0, TrapKind::DivideByZero)]
    #[case(0, 0, TrapKind::DivideByZero)]
    fn div_s_traps(#[case] a: i32, #[case] b: i32, #[case] expected: TrapKind) {
        let mut builder = ModuleBuilder::new();
        let ty = builder.add_type(FunctionType::new(
            vec![ValueType::I32, ValueType::I32],
            vec![ValueType::I32],
        ));
        let div = builder.add_function(
            ty,
            vec![],
            vec![
                InstructionKind::LocalGet { local_idx: 0 },
                InstructionKind::LocalGet { local_idx: 1 },
                InstructionKind::I32DivS,
            ],
        );
        builder.export_function("div", div);

        let (store, instance) = instantiate(&builder.encode(), &ImportObject::new()).unwrap();
        match store.invoke_export(instance, "div", &[Value::I32(a), Value::I32(b)]) {
            Err(RuntimeError::Trap(trap)) => {
                assert_eq!(trap.kind, expected);
                assert_eq!(trap.func_idx, Some(0));
                assert_eq!(trap.instr_idx, Some(2));
            }
            other => panic!("expected trap, got {other:?}"),
        }
    }

    #[test]
    fn memory_bounds_follow_growth() {
        let mut builder = ModuleBuilder::new();
        let load_ty = builder.add_type(FunctionType::new(vec![ValueType::I32], vec![ValueType::I32]));
        let grow_ty = builder.add_type(FunctionType::new(vec![], vec![ValueType::I32]));
        builder.add_memory(MemoryType {
            limits: Limits::new(1, Some(2)),
        });
        let load = builder.add_function(
            load_ty,
            vec![],
            vec![
                InstructionKind::LocalGet { local_idx: 0 },
                InstructionKind::I32Load { memarg: memarg(0) },
            ],
        );
        let grow = builder.add_function(
            grow_ty,
            vec![],
            vec![InstructionKind::I32Const { value: 1 }, InstructionKind::MemoryGrow],
        );
        builder.export_function("load", load);
        builder.export_function("grow", grow);
        builder.export_memory("memory", 0);

        let (store, instance) = instantiate(&builder.encode(), &ImportObject::new()).unwrap();
        let load = |addr: i32| store.invoke_export(instance, "load", &[Value::I32(addr)]);

        assert_eq!(
            load(65536).unwrap_err().trap_kind(),
            Some(&TrapKind::OutOfBoundsMemory)
        );
        assert_eq!(store.invoke_export(instance, "grow", &[]).unwrap(), vec![Value::I32(1)]);
        assert_eq!(load(65536).unwrap(), vec![Value::I32(0)]);
        assert_eq!(
            load(131069).unwrap_err().trap_kind(),
            Some(&TrapKind::OutOfBoundsMemory)
        );
        // Past the maximum
        assert_eq!(store.invoke_export(instance, "grow", &[]).unwrap(), vec![Value::I32(-1)]);

        let memory = store
            .get_export(instance, "memory")
            .unwrap()
            .as_memory()
            .and_then(|addr| store.memory(addr))
            .unwrap();
        assert_eq!(memory.borrow().size(), 2);
    }

    #[test]
    fn call_indirect_checks_signature_not_arity() {
        let mut builder = ModuleBuilder::new();
        let i32_ty = builder.add_type(FunctionType::new(vec![ValueType::I32], vec![ValueType::I32]));
        let f32_ty = builder.add_type(FunctionType::new(vec![ValueType::F32], vec![ValueType::I32]));
        let run_ty = builder.add_type(FunctionType::new(vec![], vec![ValueType::I32]));
        builder.add_table(TableType {
            ref_type: RefType::FuncRef,
            limits: Limits::new(1, Some(1)),
        });
        let identity = builder.add_function(i32_ty, vec![], vec![InstructionKind::LocalGet { local_idx: 0 }]);
        builder.add_active_elements(0, 0, vec![identity]);
        for (name, type_idx, arg) in [
            ("good", i32_ty, InstructionKind::I32Const { value: 9 }),
            ("bad", f32_ty, InstructionKind::F32Const { value: 9.0 }),
        ] {
            let func = builder.add_function(
                run_ty,
                vec![],
                vec![
                    arg,
                    InstructionKind::I32Const { value: 0 },
                    InstructionKind::CallIndirect { type_idx, table_idx: 0 },
                ],
            );
            builder.export_function(name, func);
        }

        let (store, instance) = instantiate(&builder.encode(), &ImportObject::new()).unwrap();
        assert_eq!(store.invoke_export(instance, "good", &[]).unwrap(), vec![Value::I32(9)]);
        assert_eq!(
            store.invoke_export(instance, "bad", &[]).unwrap_err().trap_kind(),
            Some(&TrapKind::IndirectCallTypeMismatch)
        );
    }

    fn memory_importer(min: u32) -> ValidatedModule {
        let mut builder = ModuleBuilder::new();
        builder.import(
            "env",
            "memory",
            ExternalKind::Memory(MemoryType {
                limits: Limits::new(min, None),
            }),
        );
        validated(builder)
    }

    #[rstest]
    #[case(2, false)]
    #[case(3, true)]
    #[case(5, true)]
    fn imported_memory_minimum(#[case] provided: u32, #[case] links: bool) {
        let mut store = Store::new();
        let memory = store
            .allocate_memory(MemoryType {
                limits: Limits::new(provided, None),
            })
            .unwrap();
        let mut imports = ImportObject::new();
        imports.add_memory("env", "memory", memory);

        match store.instantiate(memory_importer(3), &imports) {
            Ok(_) => assert!(links),
            Err(LinkError::IncompatibleImport { module, name, .. }) => {
                assert!(!links);
                assert_eq!((module.as_str(), name.as_str()), ("env", "memory"));
            }
            Err(e) => panic!("unexpected link error: {e}"),
        }
    }

    #[test]
    fn module_reusable_after_link_failure() {
        let module = std::rc::Rc::new(memory_importer(1));
        let mut store = Store::new();

        let err = store.instantiate(module.clone(), &ImportObject::new()).unwrap_err();
        assert!(matches!(err, LinkError::UnresolvedImport { .. }), "{err}");

        let memory = store
            .allocate_memory(MemoryType {
                limits: Limits::new(1, None),
            })
            .unwrap();
        let mut imports = ImportObject::new();
        imports.add_memory("env", "memory", memory);
        store.instantiate(module, &imports).unwrap();
    }

    #[test]
    fn start_trap_keeps_earlier_writes() {
        let mut builder = ModuleBuilder::new();
        builder.import(
            "env",
            "memory",
            ExternalKind::Memory(MemoryType {
                limits: Limits::new(1, None),
            }),
        );
        let ty = builder.add_type(FunctionType::default());
        let start = builder.add_function(
            ty,
            vec![],
            vec![
                InstructionKind::I32Const { value: 0 },
                InstructionKind::I32Const { value: 42 },
                InstructionKind::I32Store { memarg: memarg(0) },
                InstructionKind::Unreachable,
            ],
        );
        builder.start(start);
        builder.export_function("start", start);

        let mut store = Store::new();
        let memory = store
            .allocate_memory(MemoryType {
                limits: Limits::new(1, None),
            })
            .unwrap();
        let mut imports = ImportObject::new();
        imports.add_memory("env", "memory", memory);

        match store.instantiate(validated(builder), &imports) {
            Err(LinkError::StartTrap(trap)) => assert_eq!(trap.kind, TrapKind::Unreachable),
            other => panic!("expected start trap, got {other:?}"),
        }
        let memory = store.memory(memory).unwrap();
        assert_eq!(memory.borrow().read_u32(0).unwrap(), 42);

        assert!(store.instance(InstanceAddr(0)).is_none());
        assert!(matches!(
            store.invoke_export(InstanceAddr(0), "start", &[]),
            Err(RuntimeError::UnknownInstance(0))
        ));
    }

    #[test]
    fn registered_exports_are_shared() {
        // Instance "a" owns a mutable global; instance "b" imports and bumps it.
        let global_type = GlobalType {
            value_type: ValueType::I32,
            mutable: true,
        };

        let mut owner = ModuleBuilder::new();
        let counter = owner.add_global(global_type, vec![InstructionKind::I32Const { value: 10 }]);
        owner.export_global("counter", counter);
        let get_ty = owner.add_type(FunctionType::new(vec![], vec![ValueType::I32]));
        let get = owner.add_function(get_ty, vec![], vec![InstructionKind::GlobalGet { global_idx: 0 }]);
        owner.export_function("get", get);

        let mut user = ModuleBuilder::new();
        user.import("a", "counter", ExternalKind::Global(global_type));
        let bump_ty = user.add_type(FunctionType::default());
        let bump = user.add_function(
            bump_ty,
            vec![],
            vec![
                InstructionKind::GlobalGet { global_idx: 0 },
                InstructionKind::I32Const { value: 1 },
                InstructionKind::I32Add,
                InstructionKind::GlobalSet { global_idx: 0 },
            ],
        );
        user.export_function("bump", bump);

        let mut store = Store::new();
        let a = store.instantiate(validated(owner), &ImportObject::new()).unwrap();
        let mut imports = ImportObject::new();
        store.register(a, "a", &mut imports).unwrap();
        let b = store.instantiate(validated(user), &imports).unwrap();

        store.invoke_export(b, "bump", &[]).unwrap();
        store.invoke_export(b, "bump", &[]).unwrap();
        assert_eq!(store.invoke_export(a, "get", &[]).unwrap(), vec![Value::I32(12)]);
        assert!(matches!(store.get_export(a, "counter"), Ok(Extern::Global(_))));
    }

    #[test]
    fn host_trap_propagates() {
        let mut builder = ModuleBuilder::new();
        let ty = builder.add_type(FunctionType::default());
        builder.import("env", "abort", ExternalKind::Function(ty));
        let run = builder.add_function(ty, vec![], vec![InstructionKind::Call { func_idx: 0 }]);
        builder.export_function("run", run);

        let mut store = Store::new();
        let abort = store.allocate_host_function(FunctionType::default(), |_| Err(Trap::host("cancelled")));
        let mut imports = ImportObject::new();
        imports.add_function("env", "abort", abort);
        let instance = store.instantiate(validated(builder), &imports).unwrap();

        let err = store.invoke_export(instance, "run", &[]).unwrap_err();
        assert_eq!(err.trap_kind(), Some(&TrapKind::Host("cancelled".to_string())));
    }

    #[test]
    fn pipeline_errors_stay_distinct() {
        assert!(matches!(instantiate(&ADD_MODULE[..12], &ImportObject::new()), Err(Error::Decode(_))));

        let mut builder = ModuleBuilder::new();
        let ty = builder.add_type(FunctionType::new(vec![], vec![ValueType::I32]));
        builder.add_function(ty, vec![], vec![InstructionKind::I64Const { value: 1 }]);
        assert!(matches!(
            instantiate(&builder.encode(), &ImportObject::new()),
            Err(Error::Validation(_))
        ));

        let mut builder = ModuleBuilder::new();
        let ty = builder.add_type(FunctionType::default());
        builder.import("env", "missing", ExternalKind::Function(ty));
        assert!(matches!(
            instantiate(&builder.encode(), &ImportObject::new()),
            Err(Error::Link(LinkError::UnresolvedImport { .. }))
        ));
    }

    fn funcref_table(min: u32) -> TableType {
        TableType {
            ref_type: RefType::FuncRef,
            limits: Limits::new(min, None),
        }
    }

    /// Owns and exports `tab`, and exports `call(i)` which calls slot `i`
    /// as `[] -> [i32]`
    fn table_owner() -> ValidatedModule {
        let mut builder = ModuleBuilder::new();
        let returns_i32 = builder.add_type(FunctionType::new(vec![], vec![ValueType::I32]));
        let call_ty = builder.add_type(FunctionType::new(vec![ValueType::I32], vec![ValueType::I32]));
        builder.add_table(funcref_table(2));
        let call = builder.add_function(
            call_ty,
            vec![],
            vec![
                InstructionKind::LocalGet { local_idx: 0 },
                InstructionKind::CallIndirect {
                    type_idx: returns_i32,
                    table_idx: 0,
                },
            ],
        );
        builder.export_function("call", call);
        builder.export_table("tab", 0);
        validated(builder)
    }

    #[test]
    fn failed_instantiation_leaves_table_entries_callable() {
        let mut store = Store::new();
        let owner = store.instantiate(table_owner(), &ImportObject::new()).unwrap();
        let mut imports = ImportObject::new();
        store.register(owner, "owner", &mut imports).unwrap();

        // writes `f` into slot 0 of the imported table, then fails on its data segment
        let mut builder = ModuleBuilder::new();
        builder.import("owner", "tab", ExternalKind::Table(funcref_table(2)));
        let ty = builder.add_type(FunctionType::new(vec![], vec![ValueType::I32]));
        let f = builder.add_function(ty, vec![], vec![InstructionKind::I32Const { value: 7 }]);
        builder.export_function("f", f);
        builder.add_active_elements(0, 0, vec![f]);
        builder.add_memory(MemoryType {
            limits: Limits::new(1, None),
        });
        builder.add_active_data(0, 65536, b"d".to_vec());
        assert!(matches!(
            store.instantiate(validated(builder), &imports),
            Err(LinkError::InitOutOfBounds {
                segment: Segment::Data(0)
            })
        ));

        assert_eq!(
            store.invoke_export(owner, "call", &[Value::I32(0)]).unwrap(),
            vec![Value::I32(7)]
        );
        assert!(matches!(
            store.invoke_export(InstanceAddr(1), "f", &[]),
            Err(RuntimeError::UnknownInstance(1))
        ));

        // an unrelated module must not take over the failed module's functions
        let mut builder = ModuleBuilder::new();
        let ty = builder.add_type(FunctionType::new(vec![], vec![ValueType::I64]));
        let g = builder.add_function(ty, vec![], vec![InstructionKind::I64Const { value: 99 }]);
        builder.export_function("g", g);
        let other = store.instantiate(validated(builder), &ImportObject::new()).unwrap();
        assert_eq!(other, InstanceAddr(2));

        assert_eq!(
            store.invoke_export(owner, "call", &[Value::I32(0)]).unwrap(),
            vec![Value::I32(7)]
        );
        assert_eq!(store.invoke_export(other, "g", &[]).unwrap(), vec![Value::I64(99)]);
    }

    #[test]
    fn early_link_failure_allocates_nothing() {
        let mut store = Store::new();
        let mut builder = ModuleBuilder::new();
        let ty = builder.add_type(FunctionType::default());
        builder.import("env", "missing", ExternalKind::Function(ty));
        builder.add_function(ty, vec![], vec![]);
        assert!(matches!(
            store.instantiate(validated(builder), &ImportObject::new()),
            Err(LinkError::UnresolvedImport { .. })
        ));

        let host = store.allocate_host_function(FunctionType::default(), |_| Ok(vec![]));
        assert_eq!(host.0, 0);
    }

    #[test]
    fn element_segment_out_of_bounds_keeps_earlier_writes() {
        let mut store = Store::new();
        let owner = store.instantiate(table_owner(), &ImportObject::new()).unwrap();
        let mut imports = ImportObject::new();
        store.register(owner, "owner", &mut imports).unwrap();

        let mut builder = ModuleBuilder::new();
        builder.import("owner", "tab", ExternalKind::Table(funcref_table(2)));
        let ty = builder.add_type(FunctionType::new(vec![], vec![ValueType::I32]));
        let f = builder.add_function(ty, vec![], vec![InstructionKind::I32Const { value: 3 }]);
        builder.add_active_elements(0, 1, vec![f]);
        // the table has two slots, so offset 2 is past the end
        builder.add_active_elements(0, 2, vec![f]);

        assert!(matches!(
            store.instantiate(validated(builder), &imports),
            Err(LinkError::InitOutOfBounds {
                segment: Segment::Element(1)
            })
        ));
        assert_eq!(
            store.invoke_export(owner, "call", &[Value::I32(1)]).unwrap(),
            vec![Value::I32(3)]
        );
        assert_eq!(
            store.invoke_export(owner, "call", &[Value::I32(0)]).unwrap_err().trap_kind(),
            Some(&TrapKind::UninitializedElement)
        );
    }
}
