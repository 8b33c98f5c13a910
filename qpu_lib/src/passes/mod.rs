pub mod lower_ast;
